pub mod block_allocator;
pub mod vma_provider;
