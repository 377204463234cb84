use rand::seq::SliceRandom;
use rand::Rng;

const USER_AGENTS: [&str; 4] = [
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/123.0.0.0 Safari/537.36 Edg/123.0.0.0",
];

const VIEWPORTS: [(u32, u32); 4] = [(1920, 1080), (1366, 768), (1536, 864), (1440, 900)];

/// Per-session browser identity
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FingerprintConfig {
    /// User agent sent with every request
    pub user_agent: String,
    /// Window width in pixels
    pub viewport_width: u32,
    /// Window height in pixels
    pub viewport_height: u32,
}

impl FingerprintConfig {
    /// Pick a common desktop user agent and viewport at random
    #[must_use]
    pub fn randomized() -> Self {
        let mut rng = rand::thread_rng();
        let user_agent = USER_AGENTS
            .choose(&mut rng)
            .copied()
            .unwrap_or(USER_AGENTS[0]);
        let (width, height) = VIEWPORTS[rng.gen_range(0..VIEWPORTS.len())];

        Self {
            user_agent: user_agent.to_string(),
            viewport_width: width,
            viewport_height: height,
        }
    }

    /// Keep the random user agent but pin the viewport
    #[must_use]
    pub fn with_viewport(mut self, width: u32, height: u32) -> Self {
        self.viewport_width = width;
        self.viewport_height = height;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_randomized_fingerprint() {
        let config = FingerprintConfig::randomized();
        assert!(USER_AGENTS.contains(&config.user_agent.as_str()));
        assert!(VIEWPORTS.contains(&(config.viewport_width, config.viewport_height)));
    }

    #[test]
    fn test_fingerprint_variation() {
        // probabilistic, but 20 identical draws from 4 agents is ~1e-12
        let configs: Vec<_> = (0..20).map(|_| FingerprintConfig::randomized()).collect();
        let first_ua = &configs[0].user_agent;
        let all_same = configs.iter().all(|c| &c.user_agent == first_ua);
        assert!(!all_same, "Expected variation in user agents");
    }

    #[test]
    fn test_with_viewport_overrides_size() {
        let config = FingerprintConfig::randomized().with_viewport(800, 600);
        assert_eq!((config.viewport_width, config.viewport_height), (800, 600));
    }
}
