use crate::pager::{SessionOptions, Wraparound, DEFAULT_IDLE_TIMEOUT, MAX_IDLE_TIMEOUT};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Largest page that still fits an embed field once wrapped in a code fence.
pub const MAX_PAGE_SIZE: usize = 1000;

pub const DEFAULT_MODEL: &str = "gemini-1.5-flash-latest";
pub const DEFAULT_DASHBOARD_PORT: u16 = 3000;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    pub discord_bot_token: Option<String>,
    pub google_api_key: Option<String>,
    #[serde(default = "default_model")]
    pub gemini_model: String,
    pub owner_id: Option<u64>,
    #[serde(default = "default_dashboard_port")]
    pub dashboard_port: u16,
    #[serde(default)]
    pub pagination: PaginationConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            discord_bot_token: None,
            google_api_key: None,
            gemini_model: default_model(),
            owner_id: None,
            dashboard_port: DEFAULT_DASHBOARD_PORT,
            pagination: PaginationConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PaginationConfig {
    pub max_page_size: usize,
    pub idle_timeout_secs: u64,
    pub wraparound: Wraparound,
}

impl Default for PaginationConfig {
    fn default() -> Self {
        Self {
            max_page_size: MAX_PAGE_SIZE,
            idle_timeout_secs: DEFAULT_IDLE_TIMEOUT.as_secs(),
            wraparound: Wraparound::Clamp,
        }
    }
}

impl PaginationConfig {
    pub fn session_options(&self) -> SessionOptions {
        SessionOptions {
            idle_timeout: Duration::from_secs(self.idle_timeout_secs),
            wraparound: self.wraparound,
        }
    }

    fn validate(&self) -> Result<()> {
        if self.max_page_size == 0 || self.max_page_size > MAX_PAGE_SIZE {
            anyhow::bail!(
                "pagination.max_page_size must be between 1 and {}, got {}",
                MAX_PAGE_SIZE,
                self.max_page_size
            );
        }
        let max_idle = MAX_IDLE_TIMEOUT.as_secs();
        if self.idle_timeout_secs == 0 || self.idle_timeout_secs > max_idle {
            anyhow::bail!(
                "pagination.idle_timeout_secs must be between 1 and {}, got {}",
                max_idle,
                self.idle_timeout_secs
            );
        }
        Ok(())
    }
}

fn default_model() -> String {
    DEFAULT_MODEL.to_string()
}

fn default_dashboard_port() -> u16 {
    DEFAULT_DASHBOARD_PORT
}

impl Config {
    /// Get the config file path
    pub fn path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .context("Could not find config directory")?
            .join("juno");

        Ok(config_dir.join("config.json"))
    }

    /// Load config from file, then apply environment overrides
    pub fn load() -> Result<Self> {
        let mut config = Self::load_file()?;
        config.apply_overrides(|name| std::env::var(name).ok())?;
        config.pagination.validate()?;
        Ok(config)
    }

    fn load_file() -> Result<Self> {
        let path = Self::path()?;

        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config from {:?}", path))?;

        serde_json::from_str(&content).context("Failed to parse config")
    }

    /// Save config to file
    pub fn save(&self) -> Result<()> {
        let path = Self::path()?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory {:?}", parent))?;
        }

        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(&path, content)
            .with_context(|| format!("Failed to write config to {:?}", path))?;

        Ok(())
    }

    /// Environment variables win over the config file.
    fn apply_overrides(&mut self, var: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(token) = var("DISCORD_TOKEN") {
            self.discord_bot_token = Some(token);
        }
        if let Some(key) = var("GOOGLE_API_KEY") {
            self.google_api_key = Some(key);
        }
        if let Some(owner) = var("BOT_OWNER_ID") {
            let owner = owner
                .trim()
                .parse()
                .with_context(|| format!("BOT_OWNER_ID is not a user ID: {}", owner))?;
            self.owner_id = Some(owner);
        }
        if let Some(port) = var("DASHBOARD_PORT") {
            self.dashboard_port = port
                .trim()
                .parse()
                .with_context(|| format!("DASHBOARD_PORT is not a port: {}", port))?;
        }
        Ok(())
    }
}

fn prompt_line(label: &str) -> Result<String> {
    print!("{}", label);
    std::io::Write::flush(&mut std::io::stdout())?;

    let mut line = String::new();
    std::io::stdin().read_line(&mut line)?;
    Ok(line.trim().to_string())
}

/// Run the installation wizard
pub async fn install() -> Result<()> {
    println!("=== Juno Installation ===\n");

    // 1. Discord Bot Token
    println!("Step 1: Discord Bot Setup");
    println!("  1. Go to https://discord.com/developers/applications");
    println!("  2. Click 'New Application' and give it a name");
    println!("  3. Go to 'Bot' tab and click 'Reset Token' to copy the token\n");

    let token = prompt_line("Enter your Discord bot token: ")?;
    if token.is_empty() {
        anyhow::bail!("Bot token is required");
    }

    // 2. Gemini API key
    println!("\nStep 2: Google Gemini API key");
    println!("  Create one at https://aistudio.google.com/app/apikey\n");

    let api_key = prompt_line("Enter your Gemini API key: ")?;
    if api_key.is_empty() {
        anyhow::bail!("Gemini API key is required");
    }

    // 3. Owner
    println!("\nStep 3: Bot owner");
    println!("  1. Enable Developer Mode in Discord (Settings > Advanced > Developer Mode)");
    println!("  2. Right-click your username and click 'Copy User ID'\n");

    let owner = prompt_line("Enter the owner's user ID (blank to skip): ")?;
    let owner_id = if owner.is_empty() {
        println!("  (skipped - /lock and /reload-commands will be unavailable)");
        None
    } else {
        Some(
            owner
                .parse::<u64>()
                .map_err(|_| anyhow::anyhow!("Invalid user ID: {}", owner))?,
        )
    };

    // 4. Invite bot to server
    println!("\nStep 4: Invite bot to your server");
    println!("  1. Go to 'OAuth2' > 'URL Generator'");
    println!("  2. Select scopes: 'bot', 'applications.commands'");
    println!("  3. Select permissions: 'Send Messages', 'Embed Links', 'Add Reactions', 'Manage Messages'");
    println!("  4. Copy the URL and open it to invite the bot\n");

    let config = Config {
        discord_bot_token: Some(token),
        google_api_key: Some(api_key),
        owner_id,
        ..Config::load_file()?
    };
    config.save()?;

    println!("\n=== Installation Complete ===");
    println!("Config saved to: {:?}", Config::path()?);
    println!();
    println!("Next steps:");
    println!("    juno daemon              # Run the bot and the dashboard");
    println!("    juno run 'prompt'        # Try a single prompt from the terminal");
    println!("    juno config              # Show the current configuration");

    Ok(())
}

fn mask(secret: &str) -> String {
    let chars: Vec<char> = secret.chars().collect();
    if chars.len() > 10 {
        let head: String = chars[..5].iter().collect();
        let tail: String = chars[chars.len() - 5..].iter().collect();
        format!("{}...{}", head, tail)
    } else {
        "***".to_string()
    }
}

/// Show current configuration
pub fn show() -> Result<()> {
    let config = Config::load()?;
    let path = Config::path()?;

    println!("Config file: {:?}", path);
    println!();

    match &config.discord_bot_token {
        Some(token) => println!("Discord Bot Token: {}", mask(token)),
        None => println!("Discord Bot Token: (not set)"),
    }

    match &config.google_api_key {
        Some(key) => println!("Gemini API Key: {}", mask(key)),
        None => println!("Gemini API Key: (not set)"),
    }

    println!("Gemini Model: {}", config.gemini_model);

    match config.owner_id {
        Some(owner) => println!("Owner ID: {}", owner),
        None => println!("Owner ID: (none - owner commands disabled)"),
    }

    println!("Dashboard Port: {}", config.dashboard_port);
    println!(
        "Pagination: {} chars/page, {}s timeout, {:?}",
        config.pagination.max_page_size,
        config.pagination.idle_timeout_secs,
        config.pagination.wraparound
    );

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn partial_file_falls_back_to_defaults() {
        let config: Config =
            serde_json::from_str(r#"{"discord_bot_token": "abc", "pagination": {"wraparound": "wrap"}}"#)
                .unwrap();

        assert_eq!(config.discord_bot_token.as_deref(), Some("abc"));
        assert_eq!(config.gemini_model, DEFAULT_MODEL);
        assert_eq!(config.dashboard_port, DEFAULT_DASHBOARD_PORT);
        assert_eq!(config.pagination.max_page_size, MAX_PAGE_SIZE);
        assert_eq!(config.pagination.idle_timeout_secs, 60);
        assert_eq!(config.pagination.wraparound, Wraparound::Wrap);
    }

    #[test]
    fn environment_overrides_file_values() {
        let env: HashMap<&str, &str> = [
            ("DISCORD_TOKEN", "from-env"),
            ("BOT_OWNER_ID", " 42 "),
            ("DASHBOARD_PORT", "8080"),
        ]
        .into_iter()
        .collect();
        let mut config = Config {
            discord_bot_token: Some("from-file".into()),
            google_api_key: Some("key".into()),
            ..Config::default()
        };

        config
            .apply_overrides(|name| env.get(name).map(|value| value.to_string()))
            .unwrap();

        assert_eq!(config.discord_bot_token.as_deref(), Some("from-env"));
        assert_eq!(config.google_api_key.as_deref(), Some("key"));
        assert_eq!(config.owner_id, Some(42));
        assert_eq!(config.dashboard_port, 8080);
    }

    #[test]
    fn malformed_owner_override_is_an_error() {
        let mut config = Config::default();
        let result = config.apply_overrides(|name| {
            (name == "BOT_OWNER_ID").then(|| "not-a-number".to_string())
        });
        assert!(result.is_err());
    }

    #[test]
    fn page_size_must_fit_an_embed_field() {
        let oversized = PaginationConfig {
            max_page_size: MAX_PAGE_SIZE + 1,
            ..PaginationConfig::default()
        };
        assert!(oversized.validate().is_err());

        let empty = PaginationConfig {
            max_page_size: 0,
            ..PaginationConfig::default()
        };
        assert!(empty.validate().is_err());

        assert!(PaginationConfig::default().validate().is_ok());
    }

    #[test]
    fn idle_timeout_is_bounded() {
        let huge: PaginationConfig =
            serde_json::from_str(r#"{"idle_timeout_secs": 18446744073709551615}"#).unwrap();
        assert!(huge.validate().is_err());

        let zero = PaginationConfig {
            idle_timeout_secs: 0,
            ..PaginationConfig::default()
        };
        assert!(zero.validate().is_err());

        let longest = PaginationConfig {
            idle_timeout_secs: MAX_IDLE_TIMEOUT.as_secs(),
            ..PaginationConfig::default()
        };
        assert!(longest.validate().is_ok());
    }

    #[test]
    fn session_options_follow_config() {
        let config = PaginationConfig {
            idle_timeout_secs: 90,
            wraparound: Wraparound::Wrap,
            ..PaginationConfig::default()
        };
        let options = config.session_options();
        assert_eq!(options.idle_timeout, Duration::from_secs(90));
        assert_eq!(options.wraparound, Wraparound::Wrap);
    }

    #[test]
    fn secrets_are_masked() {
        assert_eq!(mask("short"), "***");
        assert_eq!(mask("abcdefghijklmnop"), "abcde...lmnop");
    }
}
