#![no_main]

use irx::index::DocId;
use irx::index::posting::{PostingBlob, PostingView};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Corrupt blobs must be reported as errors, never read out of bounds
    if let Ok(view) = PostingView::parse(data) {
        for entry in view.entries() {
            let _ = entry.positions().count();
        }
        let _ = view.contains_doc(DocId::from_inode(1));
    }
    if let Ok(mut blob) = PostingBlob::from_bytes(data) {
        let _ = blob.remove(DocId::from_inode(1));
        let _ = blob.push(DocId::from_inode(2), 0);
    }
});
