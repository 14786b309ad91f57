pub mod backend;
pub mod forget;
pub mod search;
pub mod store;
pub mod types;

pub use backend::{create_store, MemoryStore, SqliteStore, StoreKind};

/// Convert an f32 embedding slice to raw bytes for sqlite-vec.
pub fn embedding_to_bytes(embedding: &[f32]) -> &[u8] {
    unsafe {
        std::slice::from_raw_parts(
            embedding.as_ptr() as *const u8,
            std::mem::size_of_val(embedding),
        )
    }
}
