pub mod buffer_pool_manager;
