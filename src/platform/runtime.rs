use std::time::Duration;

/// Waits for `duration` without blocking the executor.
pub(crate) async fn sleep(duration: Duration) {
    if duration.is_zero() {
        return;
    }
    tokio::time::sleep(duration).await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn zero_duration_returns_immediately() {
        sleep(Duration::ZERO).await;
    }

    #[tokio::test(start_paused = true)]
    async fn sleeps_for_the_duration() {
        let start = tokio::time::Instant::now();
        sleep(Duration::from_millis(250)).await;
        assert!(start.elapsed() >= Duration::from_millis(250));
    }
}
