pub mod btree;
pub mod page;
pub mod sink;
