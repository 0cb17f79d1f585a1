pub mod http;
pub mod startup;
pub mod static_files;
