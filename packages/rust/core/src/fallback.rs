//! Try-primary / else-fallback for stages that call an unreliable generator.

use std::future::Future;

use tracing::warn;

use postcheck_shared::Result;

/// Which path produced a [`Resolved`] value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    Primary,
    Fallback,
}

/// A value that is always available, plus where it came from.
#[derive(Debug, Clone)]
pub struct Resolved<T> {
    pub value: T,
    pub source: Source,
}

impl<T> Resolved<T> {
    pub fn is_fallback(&self) -> bool {
        self.source == Source::Fallback
    }
}

/// Await `primary`; on any error log it and return `fallback()` instead.
///
/// `fallback` must be infallible, so the combined result never fails.
pub async fn primary_or_else<T, Fut, F>(label: &str, primary: Fut, fallback: F) -> Resolved<T>
where
    Fut: Future<Output = Result<T>>,
    F: FnOnce() -> T,
{
    match primary.await {
        Ok(value) => Resolved {
            value,
            source: Source::Primary,
        },
        Err(e) => {
            warn!(stage = label, error = %e, "primary path failed, using fallback");
            Resolved {
                value: fallback(),
                source: Source::Fallback,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use postcheck_shared::PostcheckError;

    #[tokio::test]
    async fn keeps_primary_value() {
        let resolved = primary_or_else("test", async { Ok(7) }, || 0).await;
        assert_eq!(resolved.value, 7);
        assert_eq!(resolved.source, Source::Primary);
        assert!(!resolved.is_fallback());
    }

    #[tokio::test]
    async fn falls_back_on_error() {
        let resolved = primary_or_else(
            "test",
            async { Err::<Vec<&str>, _>(PostcheckError::parse("not json")) },
            || vec!["fallback"],
        )
        .await;
        assert_eq!(resolved.value, vec!["fallback"]);
        assert!(resolved.is_fallback());
    }

    #[tokio::test]
    async fn fallback_not_built_when_primary_succeeds() {
        let resolved = primary_or_else("test", async { Ok("primary") }, || {
            panic!("fallback should not run")
        })
        .await;
        assert_eq!(resolved.value, "primary");
    }
}
