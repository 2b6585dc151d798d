//! Session camouflage defaults
//!
//! User agent pools and the init scripts applied to every fresh session:
//! webdriver masking, plausible navigator properties, and storage clearing so
//! repeat visits do not correlate.

use rand::Rng;

/// Desktop user agent pool. Scraped shops are desktop-priced; mobile agents
/// frequently get different storefronts.
pub const DESKTOP_USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/130.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36 Edg/131.0.0.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/18.2 Safari/605.1.15",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36",
];

/// Pick a user agent at random for a fresh session.
pub fn random_user_agent() -> &'static str {
    let mut rng = rand::thread_rng();
    DESKTOP_USER_AGENTS[rng.gen_range(0..DESKTOP_USER_AGENTS.len())]
}

/// Masks the automation flag and related giveaways.
const NAVIGATOR_MASK_SCRIPT: &str = r#"(function() {
    Object.defineProperty(navigator, 'webdriver', { get: () => undefined });
    Object.defineProperty(navigator, 'languages', {
        get: () => ['nl-NL', 'nl', 'en-US', 'en']
    });
    Object.defineProperty(screen, 'colorDepth', { get: () => 24 });
})();"#;

/// Clears client-side storage on load so repeated visits start cold.
const STORAGE_CLEAR_SCRIPT: &str = r#"(function() {
    window.addEventListener('load', () => {
        try {
            localStorage.clear();
            sessionStorage.clear();
        } catch (e) {}
    });
})();"#;

/// Init scripts every fresh session gets before the first navigation.
pub fn bootstrap_scripts() -> Vec<&'static str> {
    vec![NAVIGATOR_MASK_SCRIPT, STORAGE_CLEAR_SCRIPT]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_agent_from_pool() {
        let ua = random_user_agent();
        assert!(DESKTOP_USER_AGENTS.contains(&ua));
    }

    #[test]
    fn test_bootstrap_masks_webdriver() {
        let scripts = bootstrap_scripts();
        assert!(scripts.iter().any(|s| s.contains("webdriver")));
        assert!(scripts.iter().any(|s| s.contains("localStorage.clear")));
    }
}
