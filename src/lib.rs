#[macro_export]
macro_rules! debug_log {
    ($($arg:tt)*) => {{
        #[cfg(debug_assertions)]
        {
            eprintln!($($arg)*);
        }
    }};
}

pub mod config;
pub mod daemon;
pub mod manifest;
pub mod sanitizer;
pub mod server;
