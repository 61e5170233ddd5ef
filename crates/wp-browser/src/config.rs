//! Browser launch configuration
//!
//! The settings themselves live in `wp_core::config::BrowserConfig` so they
//! load with the rest of `webpilot.toml`; this module derives the Chrome
//! command line from them.

pub use wp_core::config::BrowserConfig;

/// Chrome flags for `config`
pub fn launch_args(config: &BrowserConfig) -> Vec<String> {
    let mut args = vec![
        format!("--window-size={},{}", config.width, config.height),
        "--no-sandbox".to_string(),
        "--disable-setuid-sandbox".to_string(),
        "--disable-dev-shm-usage".to_string(),
        "--no-first-run".to_string(),
        "--no-default-browser-check".to_string(),
    ];

    if !config.enable_gpu {
        args.push("--disable-gpu".to_string());
        args.push("--disable-software-rasterizer".to_string());
    }

    // Out-of-process iframes hide their documents from the page's script context
    if config.disable_site_isolation {
        args.push("--disable-web-security".to_string());
        args.push("--disable-site-isolation-trials".to_string());
        args.push("--disable-features=IsolateOrigins,site-per-process".to_string());
    }

    if let Some(ref ua) = config.user_agent {
        args.push(format!("--user-agent={}", ua));
    }

    args
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_launch_args() {
        let args = launch_args(&BrowserConfig::default());
        assert!(args.contains(&"--window-size=1280,1100".to_string()));
        assert!(args.contains(&"--disable-gpu".to_string()));
        assert!(args.iter().any(|a| a.contains("site-per-process")));

        let args = launch_args(&BrowserConfig {
            enable_gpu: true,
            disable_site_isolation: false,
            user_agent: Some("bot/1.0".to_string()),
            ..BrowserConfig::default()
        });
        assert!(!args.contains(&"--disable-gpu".to_string()));
        assert!(!args.iter().any(|a| a.contains("site-per-process")));
        assert_eq!(args.last().unwrap(), "--user-agent=bot/1.0");
    }
}
