//! Runtime utilities that wrap Tokio's runtime primitives so downstream
//! crates never depend on Tokio directly.

pub use tokio::runtime::{Builder, Handle, Runtime};

/// Runs the provided future to completion on a fresh current-thread runtime.
///
/// Returns an error when the runtime itself cannot be constructed.
pub fn block_on<F>(future: F) -> std::io::Result<F::Output>
where
    F: std::future::Future,
{
    let runtime = Builder::new_current_thread().enable_all().build()?;
    Ok(runtime.block_on(future))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_on_returns_output() {
        let value = block_on(async { 7 * 6 }).unwrap();
        assert_eq!(value, 42);
    }
}
