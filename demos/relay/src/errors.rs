use tonic::{Code, Status};
use tracing::warn;

use crate::print::print_deadline_reached;

/// Collapse a failed hop into the status returned upstream.
pub fn handle_error(status: Status, hops: i32) -> Status {
    if is_context_error(&status) {
        print_deadline_reached(hops);
        return Status::deadline_exceeded("deadline exceeded");
    }
    warn!("{hops}: unexpected error: {}", status.message());
    Status::internal(status.message().to_string())
}

pub fn is_context_error(status: &Status) -> bool {
    matches!(status.code(), Code::Cancelled | Code::DeadlineExceeded)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_failures_become_deadline_exceeded() {
        for status in [Status::cancelled("x"), Status::deadline_exceeded("y")] {
            assert_eq!(handle_error(status, 1).code(), Code::DeadlineExceeded);
        }
    }

    #[test]
    fn other_failures_become_internal() {
        let status = handle_error(Status::unavailable("connection refused"), 2);
        assert_eq!(status.code(), Code::Internal);
        assert_eq!(status.message(), "connection refused");
    }
}
