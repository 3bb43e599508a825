// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Deadline wrapper for repository and messenger calls.

use std::future::Future;
use std::time::Duration;

use courier_core::CourierError;

/// Runs `fut`, failing with [`CourierError::Timeout`] once `limit` elapses.
pub async fn with_deadline<T, F>(limit: Duration, fut: F) -> Result<T, CourierError>
where
    F: Future<Output = Result<T, CourierError>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(CourierError::Timeout { duration: limit }),
    }
}
