//! HTML renderers for the two views. Each returns a standalone fragment
//! string; the sync controller decides which fragment goes in which
//! message.

pub mod simd_table;
pub mod watch_rows;

pub use simd_table::{render_error, render_idle, render_simd_table};
pub use watch_rows::{render_rows, render_watch_table};

fn escape_html(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}
