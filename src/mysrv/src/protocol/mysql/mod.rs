pub mod basic;
pub mod binlog;
pub mod constants;
pub mod error_codes;
pub mod packet;
pub mod params;
pub mod value;
