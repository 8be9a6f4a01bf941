#![no_main]
use cartdrive::{CartConfig, CartStorage, Geometry};
use libfuzzer_sys::{
    arbitrary::{Arbitrary, Unstructured},
    fuzz_target,
};

#[derive(Debug, Arbitrary)]
enum FileOp {
    Open(u8),
    Close(u8),
    Write(u8, Vec<u8>),
    Read(u8, u16),
    Seek(u8, u16),
}

// Random operation sequences must never panic or break frame accounting
fuzz_target!(|input: &[u8]| {
    let mut u = Unstructured::new(input);
    let ops: Vec<FileOp> = match u.arbitrary() {
        Ok(ops) => ops,
        Err(_) => return,
    };

    let mut config = CartConfig::default();
    config.geometry = Geometry::new(2, 16, 16);
    config.cache.capacity = 4;
    let mut storage = match CartStorage::in_memory(config) {
        Ok(s) => s,
        Err(_) => return,
    };
    if storage.poweron().is_err() {
        return;
    }

    let mut handles = Vec::new();
    for op in ops.iter().take(64) {
        match op {
            FileOp::Open(name) => {
                if let Ok(handle) = storage.open(&format!("f{}", name % 8)) {
                    handles.push(handle);
                }
            }
            FileOp::Close(idx) => {
                if !handles.is_empty() {
                    let handle = handles.remove(*idx as usize % handles.len());
                    let _ = storage.close(handle);
                }
            }
            FileOp::Write(idx, data) => {
                if let Some(&handle) = handles.get(*idx as usize % handles.len().max(1)) {
                    let _ = storage.write(handle, data);
                }
            }
            FileOp::Read(idx, len) => {
                if let Some(&handle) = handles.get(*idx as usize % handles.len().max(1)) {
                    let mut buf = vec![0u8; *len as usize % 512];
                    let _ = storage.read(handle, &mut buf);
                }
            }
            FileOp::Seek(idx, offset) => {
                if let Some(&handle) = handles.get(*idx as usize % handles.len().max(1)) {
                    let _ = storage.seek(handle, *offset as usize);
                }
            }
        }

        let owned: usize = storage.open_files().iter().map(|f| f.frames.len()).sum();
        let stats = storage.stats();
        assert_eq!(stats.used_frames, owned);
        assert_eq!(stats.free_frames + stats.used_frames, stats.total_frames);
    }
});
