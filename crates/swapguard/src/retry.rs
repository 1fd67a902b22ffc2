//! Endpoint failover for read-only RPC calls.
//!
//! Writes never go through here: a dispatched transaction is sent once and its outcome is
//! reported as-is.

use crate::config::RpcConfig;
use std::{future::Future, time::Duration};

#[derive(Debug, Clone)]
pub struct FailoverPolicy {
    /// Full passes over the endpoint list. Each pass tries every endpoint once.
    pub rounds: usize,
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Random jitter (`0..=jitter_max_ms`) added to each pause between passes.
    pub jitter_max_ms: u64,
}

impl Default for FailoverPolicy {
    fn default() -> Self {
        Self {
            rounds: 1,
            base_delay: Duration::from_millis(400),
            max_delay: Duration::from_secs(4),
            jitter_max_ms: 250,
        }
    }
}

impl From<&RpcConfig> for FailoverPolicy {
    fn from(cfg: &RpcConfig) -> Self {
        Self {
            rounds: cfg.read_rounds.max(1),
            ..Self::default()
        }
    }
}

fn pause_after_round(policy: &FailoverPolicy, round: usize) -> Duration {
    let shift = u32::try_from(round.min(16)).unwrap_or(16_u32);
    let factor = 1_u64.checked_shl(shift).unwrap_or(u64::MAX);
    let base_ms = u64::try_from(policy.base_delay.as_millis()).unwrap_or(u64::MAX);
    let max_ms = u64::try_from(policy.max_delay.as_millis()).unwrap_or(u64::MAX);
    let ms = base_ms.saturating_mul(factor).min(max_ms);
    let jitter = if cfg!(test) || policy.jitter_max_ms == 0 {
        0
    } else {
        rand::random::<u64>() % policy.jitter_max_ms.saturating_add(1).max(1)
    };
    Duration::from_millis(ms.saturating_add(jitter))
}

/// Run `op` against each endpoint in order until one succeeds. Between passes, pause with
/// exponential backoff, and only once every endpoint has failed.
pub async fn first_success<I, T, Fut>(
    endpoints: &[I],
    policy: &FailoverPolicy,
    mut op: impl FnMut(&I) -> Fut + Send,
    label: &'static str,
) -> eyre::Result<T>
where
    I: Sync,
    Fut: Future<Output = eyre::Result<T>> + Send,
{
    if endpoints.is_empty() {
        eyre::bail!("no endpoints configured");
    }

    let rounds = policy.rounds.max(1);
    let mut last_err: Option<eyre::Report> = None;
    for round in 0..rounds {
        for endpoint in endpoints {
            match op(endpoint).await {
                Ok(v) => return Ok(v),
                Err(e) => {
                    tracing::debug!(label, round, error = %format!("{e:#}"), "endpoint failed");
                    last_err = Some(e);
                }
            }
        }
        if round + 1 < rounds {
            tokio::time::sleep(pause_after_round(policy, round)).await;
        }
    }

    Err(last_err
        .unwrap_or_else(|| eyre::eyre!("unknown error"))
        .wrap_err(label))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[tokio::test(start_paused = true)]
    async fn visits_endpoints_in_order_each_round() -> eyre::Result<()> {
        let endpoints = vec!["a", "b"];
        let policy = FailoverPolicy {
            rounds: 2,
            ..FailoverPolicy::default()
        };
        let seen: Arc<Mutex<Vec<&str>>> = Arc::new(Mutex::new(vec![]));
        let seen2 = Arc::clone(&seen);

        let res: eyre::Result<()> = first_success(
            &endpoints,
            &policy,
            move |e| {
                let e = *e;
                let seen3 = Arc::clone(&seen2);
                async move {
                    {
                        let mut guard = seen3
                            .lock()
                            .map_err(|err| eyre::eyre!("mutex poisoned: {err}"))?;
                        guard.push(e);
                    }
                    eyre::bail!("down")
                }
            },
            "read",
        )
        .await;

        let err = res.err().map(|e| format!("{e:#}")).unwrap_or_default();
        assert!(err.starts_with("read"), "label wraps last error: {err}");
        let got = seen
            .lock()
            .map_err(|err| eyre::eyre!("mutex poisoned: {err}"))?
            .clone();
        assert_eq!(got, vec!["a", "b", "a", "b"], "two ordered passes");
        Ok(())
    }

    #[tokio::test]
    async fn stops_at_first_healthy_endpoint() -> eyre::Result<()> {
        let endpoints = vec![1_u8, 2, 3];
        let out = first_success(
            &endpoints,
            &FailoverPolicy::default(),
            |e| {
                let e = *e;
                async move {
                    if e == 2 {
                        Ok(e)
                    } else {
                        eyre::bail!("down")
                    }
                }
            },
            "read",
        )
        .await?;
        assert_eq!(out, 2, "second endpoint answers");
        Ok(())
    }

    #[test]
    fn pause_is_capped() {
        let policy = FailoverPolicy::default();
        assert_eq!(pause_after_round(&policy, 0), Duration::from_millis(400), "first");
        assert_eq!(pause_after_round(&policy, 10), Duration::from_secs(4), "capped");
    }
}
