//! Miscellaneus utilities.

/// Render an error and its chain of sources, one per line, each generation
/// indented a bit deeper than its parent.
pub fn aggregate_error_tree<Error: std::error::Error + 'static>(
    error: &Error,
    indent_step: usize,
) -> String {
    let mut next: Option<&(dyn std::error::Error)> = Some(error);
    let mut gen: usize = 0;
    let mut aggregated: String = String::new();
    while let Some(node) = next {
        let indent: String = " ".repeat(gen * indent_step);
        aggregated.push_str(&indent);
        aggregated.push_str(&format!("{}", node));
        aggregated.push('\n');
        next = node.source();
        gen = gen + 1;
    }
    return aggregated;
}

/// Shared flag for asking a long running operation to give up early.
///
/// Clones observe the same flag. Operations poll it between units of work
/// (download chunks, child process wait ticks).
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: std::sync::Arc<std::sync::atomic::AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        return Self::default();
    }

    pub fn cancel(&self) {
        self.flag.store(true, std::sync::atomic::Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        return self.flag.load(std::sync::atomic::Ordering::SeqCst);
    }

    /// Clear a previous cancellation so the token can guard the next
    /// operation.
    pub fn reset(&self) {
        self.flag.store(false, std::sync::atomic::Ordering::SeqCst);
    }
}
