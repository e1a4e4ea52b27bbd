//! Configuration types for the chat application.
//!
//! Settings are resolved in three layers: built-in defaults, then an optional
//! YAML file, then command-line flags parsed via `arrrg`.

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use arrrg_derive::CommandLine;
use serde::{Deserialize, Serialize};

use crate::chat::role::UserRole;
use crate::error::{Error, Result};
use crate::types::{GenerationConfig, Model};

/// Default sampling temperature.
pub const DEFAULT_TEMPERATURE: f32 = 0.3;

/// Default maximum tokens per response.
pub const DEFAULT_MAX_TOKENS: u32 = 2048;

/// Smallest accepted response length.
pub const MIN_MAX_TOKENS: u32 = 512;

/// Largest accepted response length.
pub const MAX_MAX_TOKENS: u32 = 8192;

/// Response lengths move in steps of this size.
pub const MAX_TOKENS_STEP: u32 = 512;

/// Nucleus sampling value used for every binding.
pub const TOP_P: f32 = 0.95;

/// Top-k sampling limit used for every binding.
pub const TOP_K: u32 = 50;

/// What happens to a live binding when generation parameters change.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BindingPolicy {
    /// Drop the binding; the next exchange opens a new one with empty
    /// remote-side history.
    #[default]
    Rebuild,
    /// Keep the binding as is and apply the change on the next reset.
    Defer,
}

impl fmt::Display for BindingPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BindingPolicy::Rebuild => f.write_str("rebuild"),
            BindingPolicy::Defer => f.write_str("defer"),
        }
    }
}

impl FromStr for BindingPolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "rebuild" => Ok(BindingPolicy::Rebuild),
            "defer" => Ok(BindingPolicy::Defer),
            _ => Err(Error::validation(
                format!("unknown binding policy '{s}' (expected rebuild or defer)"),
                Some("policy".to_string()),
            )),
        }
    }
}

/// Command-line arguments for the urochat tool.
#[derive(CommandLine, Debug, Default, Eq, PartialEq)]
pub struct ChatArgs {
    /// Role of the person asking.
    #[arrrg(optional, "Your role: patient, student, urologist (default: patient)", "ROLE")]
    pub role: Option<String>,

    /// Sampling temperature.
    #[arrrg(optional, "Response specificity from 0.0 to 1.0 (default: 0.3)", "TEMP")]
    pub temperature: Option<String>,

    /// Maximum tokens per response.
    #[arrrg(optional, "Max response length, 512-8192 in steps of 512 (default: 2048)", "TOKENS")]
    pub max_tokens: Option<u32>,

    /// Model to use for chat.
    #[arrrg(optional, "Model to use (default: gemini-2.5-pro-preview-03-25)", "MODEL")]
    pub model: Option<String>,

    /// Policy for parameter changes mid-conversation.
    #[arrrg(optional, "On parameter change: rebuild or defer (default: rebuild)", "POLICY")]
    pub policy: Option<String>,

    /// YAML file holding default settings.
    #[arrrg(optional, "YAML configuration file", "PATH")]
    pub config: Option<String>,

    /// Disable ANSI colors and styles.
    #[arrrg(flag, "Disable ANSI colors/styles")]
    pub no_color: bool,
}

/// Settings read from a YAML configuration file.
///
/// Every key is optional; unknown keys are rejected.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
    pub role: Option<String>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    pub model: Option<String>,
    pub policy: Option<BindingPolicy>,
    pub color: Option<bool>,
}

impl ConfigFile {
    /// Parse configuration from YAML text.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(yaml).map_err(|err| {
            Error::serialization(
                format!("failed to parse configuration: {err}"),
                Some(Box::new(err)),
            )
        })
    }

    /// Read and parse a configuration file.
    pub fn load(path: &Path) -> Result<Self> {
        let yaml = std::fs::read_to_string(path).map_err(|err| {
            Error::io(
                format!("failed to read configuration file {}", path.display()),
                err,
            )
        })?;
        Self::from_yaml(&yaml)
    }
}

/// Configuration for a chat session.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatConfig {
    /// The role composed into every prompt.
    pub role: UserRole,

    /// Sampling temperature, 0.0 to 1.0.
    pub temperature: f32,

    /// Maximum tokens per response.
    pub max_tokens: u32,

    /// The model to use for generating responses.
    pub model: Model,

    /// Top-p nucleus sampling value.
    pub top_p: f32,

    /// Top-k sampling limit.
    pub top_k: u32,

    /// Whether to use ANSI colors and styles in output.
    pub use_color: bool,

    /// How parameter changes interact with a live binding.
    pub binding_policy: BindingPolicy,
}

impl ChatConfig {
    /// Creates a new ChatConfig with default values.
    ///
    /// Defaults:
    /// - Role: Patient
    /// - Temperature: 0.3
    /// - Max tokens: 2048
    /// - Model: gemini-2.5-pro-preview-03-25
    /// - Color: enabled
    /// - Policy: rebuild
    pub fn new() -> Self {
        Self {
            role: UserRole::default(),
            temperature: DEFAULT_TEMPERATURE,
            max_tokens: DEFAULT_MAX_TOKENS,
            model: Model::default(),
            top_p: TOP_P,
            top_k: TOP_K,
            use_color: true,
            binding_policy: BindingPolicy::default(),
        }
    }

    /// Sets the role.
    pub fn with_role(mut self, role: UserRole) -> Self {
        self.role = role;
        self
    }

    /// Sets the sampling temperature.
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// Sets the maximum tokens per response.
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    /// Sets the model to use.
    pub fn with_model(mut self, model: Model) -> Self {
        self.model = model;
        self
    }

    /// Sets the binding policy.
    pub fn with_binding_policy(mut self, policy: BindingPolicy) -> Self {
        self.binding_policy = policy;
        self
    }

    /// Disables ANSI color output.
    pub fn without_color(mut self) -> Self {
        self.use_color = false;
        self
    }

    /// The generation settings a new binding is created with.
    pub fn generation_config(&self) -> GenerationConfig {
        GenerationConfig::new()
            .with_temperature(self.temperature)
            .with_top_p(self.top_p)
            .with_top_k(self.top_k)
            .with_max_output_tokens(self.max_tokens)
    }

    /// Checks that every value is within its accepted range.
    pub fn validate(&self) -> Result<()> {
        validate_temperature(self.temperature)?;
        validate_max_tokens(self.max_tokens)
    }

    /// Overlay the values present in a configuration file.
    pub fn apply_file(mut self, file: ConfigFile) -> Result<Self> {
        if let Some(role) = file.role {
            self.role = parse_role(&role)?;
        }
        if let Some(temperature) = file.temperature {
            self.temperature = temperature;
        }
        if let Some(max_tokens) = file.max_tokens {
            self.max_tokens = max_tokens;
        }
        if let Some(model) = file.model {
            self.model = parse_model(&model);
        }
        if let Some(policy) = file.policy {
            self.binding_policy = policy;
        }
        if let Some(color) = file.color {
            self.use_color = color;
        }
        Ok(self)
    }

    /// Overlay the values given on the command line.
    pub fn apply_args(mut self, args: &ChatArgs) -> Result<Self> {
        if let Some(role) = &args.role {
            self.role = parse_role(role)?;
        }
        if let Some(temperature) = &args.temperature {
            self.temperature = parse_temperature(temperature)?;
        }
        if let Some(max_tokens) = args.max_tokens {
            self.max_tokens = max_tokens;
        }
        if let Some(model) = &args.model {
            self.model = parse_model(model);
        }
        if let Some(policy) = &args.policy {
            self.binding_policy = policy.parse()?;
        }
        if args.no_color {
            self.use_color = false;
        }
        Ok(self)
    }
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl TryFrom<ChatArgs> for ChatConfig {
    type Error = Error;

    fn try_from(args: ChatArgs) -> Result<Self> {
        let mut config = ChatConfig::new();
        if let Some(path) = &args.config {
            config = config.apply_file(ConfigFile::load(Path::new(path))?)?;
        }
        let config = config.apply_args(&args)?;
        config.validate()?;
        Ok(config)
    }
}

/// Parse a temperature given as text and check its range.
pub fn parse_temperature(value: &str) -> Result<f32> {
    let temperature = value.trim().parse::<f32>().map_err(|_| {
        Error::validation(
            format!("temperature must be a number, got '{value}'"),
            Some("temperature".to_string()),
        )
    })?;
    validate_temperature(temperature)?;
    Ok(temperature)
}

/// Reject temperatures outside 0.0 to 1.0.
pub fn validate_temperature(temperature: f32) -> Result<()> {
    if !(0.0..=1.0).contains(&temperature) {
        return Err(Error::validation(
            format!("temperature must be between 0.0 and 1.0, got {temperature}"),
            Some("temperature".to_string()),
        ));
    }
    Ok(())
}

/// Reject response lengths outside 512 to 8192 or off the 512 grid.
pub fn validate_max_tokens(max_tokens: u32) -> Result<()> {
    if !(MIN_MAX_TOKENS..=MAX_MAX_TOKENS).contains(&max_tokens)
        || max_tokens % MAX_TOKENS_STEP != 0
    {
        return Err(Error::validation(
            format!(
                "max_tokens must be a multiple of {MAX_TOKENS_STEP} between {MIN_MAX_TOKENS} and {MAX_MAX_TOKENS}, got {max_tokens}"
            ),
            Some("max_tokens".to_string()),
        ));
    }
    Ok(())
}

fn parse_role(role: &str) -> Result<UserRole> {
    role.parse::<UserRole>()
        .map_err(|err| Error::validation(err.to_string(), Some("role".to_string())))
}

fn parse_model(model: &str) -> Model {
    match model.parse::<Model>() {
        Ok(model) => model,
        Err(never) => match never {},
    }
}
