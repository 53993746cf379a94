pub mod heap_file;
pub mod manager;
