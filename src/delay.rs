use std::time::Duration;

/// Suspend the current task for at least `duration`.
///
/// Never fails and has no cancellation hook of its own; callers that need to
/// abandon a delay race it against a `CancellationToken` with `tokio::select!`.
pub async fn delay(duration: Duration) {
    tokio::time::sleep(duration).await;
}
