use governor::{
    Quota, RateLimiter as GovernorRateLimiter,
    clock::{QuantaClock, QuantaInstant},
    middleware::NoOpMiddleware,
    state::{InMemoryState, NotKeyed},
};
use nonzero_ext::nonzero;
use std::{num::NonZeroU32, time::Duration};

// A handful of attachments per run; stay gentle with the ministry's server.
const REQ_PER_SEC: NonZeroU32 = nonzero!(4u32);
const MS_BETWEEN_REQ: Duration = Duration::from_millis(200);

type SpecificGovernorRateLimiter =
    GovernorRateLimiter<NotKeyed, InMemoryState, QuantaClock, NoOpMiddleware<QuantaInstant>>;

pub struct RateLimiter {
    req_per_sec: SpecificGovernorRateLimiter,
    ms_between_req: SpecificGovernorRateLimiter,
}

impl RateLimiter {
    pub fn new() -> anyhow::Result<Self> {
        Self::with_limits(REQ_PER_SEC, MS_BETWEEN_REQ)
    }

    pub fn with_limits(req_per_sec: NonZeroU32, between: Duration) -> anyhow::Result<Self> {
        // Limit to X total req/sec on average.
        let req_per_sec = GovernorRateLimiter::direct(Quota::per_second(req_per_sec));

        // No two requests closer than Y ms.
        let quota = Quota::with_period(between)
            .ok_or_else(|| anyhow::anyhow!("request spacing must be non-zero"))?;
        let ms_between_req = GovernorRateLimiter::direct(quota);

        Ok(RateLimiter {
            req_per_sec,
            ms_between_req,
        })
    }

    pub async fn wait_until_ready(&self) {
        // Average rate first, then spacing: the spacing check lets only one
        // caller through every Y ms, so it must be the last gate.
        self.req_per_sec.until_ready().await;
        self.ms_between_req.until_ready().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_spacing_is_rejected() {
        assert!(RateLimiter::with_limits(nonzero!(1u32), Duration::ZERO).is_err());
    }

    #[tokio::test]
    async fn spaces_consecutive_requests() {
        let limiter = RateLimiter::with_limits(nonzero!(100u32), Duration::from_millis(30)).unwrap();
        let start = std::time::Instant::now();
        limiter.wait_until_ready().await;
        limiter.wait_until_ready().await;
        assert!(start.elapsed() >= Duration::from_millis(25));
    }
}
