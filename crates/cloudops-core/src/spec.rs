//! Command specs, flag definitions and argument validation
//!
//! A [`CommandSpec`] is the static description of one lifecycle verb. Raw CLI
//! input goes through two steps before any provider hook sees it:
//!
//! 1. [`CommandSpec::parse_tokens`] turns argv-style tokens into [`RawArgs`],
//!    using a `clap::Command` built from the spec
//! 2. [`CommandSpec::validate`] turns [`RawArgs`] into typed [`InvocationArgs`]
//!
//! Validation is fail-fast and reports the first offending flag only.

use crate::error::{SpecError, ValidationError};
use clap::error::{ContextKind, ContextValue, ErrorKind};
use clap::parser::ValueSource;
use clap::{Arg, ArgAction};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Raw `flag -> value` mapping as it comes off the command line
pub type RawArgs = BTreeMap<String, String>;

/// Value type of a flag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlagType {
    String,
    Bool,
    Int,
    /// Comma separated on the raw side, a list of strings once validated
    List,
}

impl std::fmt::Display for FlagType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FlagType::String => write!(f, "string"),
            FlagType::Bool => write!(f, "bool"),
            FlagType::Int => write!(f, "int"),
            FlagType::List => write!(f, "list"),
        }
    }
}

/// A typed flag value
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FlagValue {
    Bool(bool),
    Int(i64),
    Str(String),
    List(Vec<String>),
}

impl FlagValue {
    fn flag_type(&self) -> FlagType {
        match self {
            FlagValue::Bool(_) => FlagType::Bool,
            FlagValue::Int(_) => FlagType::Int,
            FlagValue::Str(_) => FlagType::String,
            FlagValue::List(_) => FlagType::List,
        }
    }
}

/// Definition of a single flag accepted by a command
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FlagDefinition {
    pub name: String,

    #[serde(rename = "type")]
    pub kind: FlagType,

    pub required: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<FlagValue>,

    /// Allowed values; empty means unrestricted
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub choices: Vec<String>,

    /// Bound to the first bare (non `--`) token on the command line
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub positional: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub help: Option<String>,
}

impl FlagDefinition {
    fn new(name: impl Into<String>, kind: FlagType) -> Self {
        Self {
            name: name.into(),
            kind,
            required: false,
            default: None,
            choices: Vec::new(),
            positional: false,
            help: None,
        }
    }

    pub fn string(name: impl Into<String>) -> Self {
        Self::new(name, FlagType::String)
    }

    pub fn int(name: impl Into<String>) -> Self {
        Self::new(name, FlagType::Int)
    }

    pub fn list(name: impl Into<String>) -> Self {
        Self::new(name, FlagType::List)
    }

    /// Boolean flag that is `false` unless given
    pub fn switch(name: impl Into<String>) -> Self {
        Self::new(name, FlagType::Bool).default_value(FlagValue::Bool(false))
    }

    /// Required string bound to the first bare token
    pub fn positional(name: impl Into<String>) -> Self {
        let mut flag = Self::string(name).required();
        flag.positional = true;
        flag
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn default_value(mut self, value: FlagValue) -> Self {
        self.default = Some(value);
        self
    }

    pub fn default_str(self, value: impl Into<String>) -> Self {
        self.default_value(FlagValue::Str(value.into()))
    }

    pub fn default_int(self, value: i64) -> Self {
        self.default_value(FlagValue::Int(value))
    }

    pub fn choices<I, S>(mut self, choices: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.choices = choices.into_iter().map(Into::into).collect();
        self
    }

    pub fn help(mut self, help: impl Into<String>) -> Self {
        self.help = Some(help.into());
        self
    }

    fn check_choice(&self, value: &str) -> Result<(), ValidationError> {
        if self.choices.is_empty() || self.choices.iter().any(|c| c == value) {
            return Ok(());
        }
        Err(ValidationError::new(
            &self.name,
            format!(
                "invalid choice: '{}' (choose from {})",
                value,
                self.choices.join(", ")
            ),
        ))
    }

    /// Tokenizer-only view of the flag. Required flags, defaults and
    /// choices stay out of clap so that validation reports them.
    fn clap_arg(&self) -> Arg {
        let arg = Arg::new(self.name.clone());
        if self.positional {
            return arg.index(1).action(ArgAction::Set);
        }
        let arg = arg.long(self.name.clone());
        match self.kind {
            FlagType::Bool => arg.action(ArgAction::SetTrue),
            FlagType::List => arg.action(ArgAction::Append).num_args(1..),
            FlagType::Int => arg.action(ArgAction::Set).allow_negative_numbers(true),
            FlagType::String => arg.action(ArgAction::Set),
        }
    }

    /// Coerce a raw string into this flag's type
    fn coerce(&self, raw: &str) -> Result<FlagValue, ValidationError> {
        match self.kind {
            FlagType::String => {
                self.check_choice(raw)?;
                Ok(FlagValue::Str(raw.to_string()))
            }
            FlagType::Bool => match raw.to_ascii_lowercase().as_str() {
                "true" => Ok(FlagValue::Bool(true)),
                "false" => Ok(FlagValue::Bool(false)),
                _ => Err(ValidationError::new(
                    &self.name,
                    format!("invalid boolean value: '{}'", raw),
                )),
            },
            FlagType::Int => raw.trim().parse::<i64>().map(FlagValue::Int).map_err(|_| {
                ValidationError::new(&self.name, format!("invalid int value: '{}'", raw))
            }),
            FlagType::List => {
                let items: Vec<String> = raw
                    .split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect();
                for item in &items {
                    self.check_choice(item)?;
                }
                Ok(FlagValue::List(items))
            }
        }
    }
}

/// Static descriptor of one lifecycle verb
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommandSpec {
    name: String,
    flags: Vec<FlagDefinition>,
    requires_credentials: bool,
}

impl CommandSpec {
    pub fn builder(name: impl Into<String>) -> CommandSpecBuilder {
        CommandSpecBuilder {
            name: name.into(),
            flags: Vec::new(),
            requires_credentials: true,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn flags(&self) -> &[FlagDefinition] {
        &self.flags
    }

    pub fn requires_credentials(&self) -> bool {
        self.requires_credentials
    }

    pub fn flag(&self, name: &str) -> Option<&FlagDefinition> {
        self.flags.iter().find(|f| f.name == name)
    }

    pub fn positional(&self) -> Option<&FlagDefinition> {
        self.flags.iter().find(|f| f.positional)
    }

    /// Extend the spec with more flags, keeping its invariants
    pub fn with_flags<I>(self, flags: I) -> Result<Self, SpecError>
    where
        I: IntoIterator<Item = FlagDefinition>,
    {
        let mut builder = CommandSpecBuilder {
            name: self.name,
            flags: self.flags,
            requires_credentials: self.requires_credentials,
        };
        for flag in flags {
            builder = builder.flag(flag);
        }
        builder.build()
    }

    /// Validate raw input into typed arguments.
    ///
    /// Order: unknown flags, missing required flags, type/choice coercion,
    /// then defaults for whatever is still absent.
    pub fn validate(&self, raw: &RawArgs) -> Result<InvocationArgs, ValidationError> {
        if let Some(unknown) = raw.keys().find(|k| self.flag(k).is_none()) {
            return Err(ValidationError::new(unknown, "unrecognized argument"));
        }

        if let Some(missing) = self
            .flags
            .iter()
            .find(|f| f.required && !raw.contains_key(&f.name))
        {
            return Err(ValidationError::new(&missing.name, "is required"));
        }

        let mut values = BTreeMap::new();
        for flag in &self.flags {
            if let Some(value) = raw.get(&flag.name) {
                values.insert(flag.name.clone(), flag.coerce(value)?);
            }
        }

        for flag in &self.flags {
            if let Some(default) = &flag.default {
                values
                    .entry(flag.name.clone())
                    .or_insert_with(|| default.clone());
            }
        }

        Ok(InvocationArgs { values })
    }

    /// Split argv-style tokens into raw `flag -> value` pairs.
    ///
    /// Tokenizing is clap's job: bool flags take no value, list flags take
    /// every following bare token, and the first other bare token binds to
    /// the positional flag. Typing, choices, required flags and defaults are
    /// left to [`CommandSpec::validate`], so only what was actually typed
    /// lands in the result.
    pub fn parse_tokens<S: AsRef<str>>(&self, tokens: &[S]) -> Result<RawArgs, ValidationError> {
        let matches = self
            .clap_command()
            .try_get_matches_from(tokens.iter().map(|t| t.as_ref()))
            .map_err(|e| self.parse_error(&e))?;

        let mut raw = RawArgs::new();
        for flag in &self.flags {
            if matches.value_source(&flag.name) != Some(ValueSource::CommandLine) {
                continue;
            }
            let values: Vec<String> = matches
                .try_get_raw(&flag.name)
                .ok()
                .flatten()
                .into_iter()
                .flatten()
                .map(|v| v.to_string_lossy().into_owned())
                .collect();
            raw.insert(flag.name.clone(), values.join(","));
        }
        Ok(raw)
    }

    fn clap_command(&self) -> clap::Command {
        clap::Command::new(self.name.clone())
            .no_binary_name(true)
            .disable_help_flag(true)
            .disable_version_flag(true)
            .args(self.flags.iter().map(FlagDefinition::clap_arg))
    }

    fn parse_error(&self, err: &clap::Error) -> ValidationError {
        let arg = match err.get(ContextKind::InvalidArg) {
            Some(ContextValue::String(arg)) => arg.as_str(),
            _ => "",
        };
        // clap renders the arg as `--zone <zone>`, `--zone=a` or `[search_pattern]`
        let name = arg
            .trim_start_matches('-')
            .split([' ', '='])
            .next()
            .unwrap_or_default()
            .trim_matches(|c| c == '[' || c == ']' || c == '<' || c == '>');

        match err.kind() {
            ErrorKind::UnknownArgument if arg.starts_with("--") => {
                ValidationError::new(name, "unrecognized argument")
            }
            ErrorKind::UnknownArgument => ValidationError::Unrecognized(vec![arg.to_string()]),
            ErrorKind::ArgumentConflict => ValidationError::new(name, "specified more than once"),
            ErrorKind::InvalidValue | ErrorKind::TooFewValues => {
                match self.flag(name).map(|f| f.kind) {
                    Some(FlagType::List) => {
                        ValidationError::new(name, "expected at least one argument")
                    }
                    _ => ValidationError::new(name, "expected one argument"),
                }
            }
            ErrorKind::TooManyValues => ValidationError::new(name, "ignored explicit argument"),
            kind => ValidationError::new(name, kind.as_str().unwrap_or("invalid argument")),
        }
    }
}

/// Builder enforcing the spec invariants at construction time
#[derive(Debug, Clone)]
pub struct CommandSpecBuilder {
    name: String,
    flags: Vec<FlagDefinition>,
    requires_credentials: bool,
}

impl CommandSpecBuilder {
    pub fn flag(mut self, flag: FlagDefinition) -> Self {
        self.flags.push(flag);
        self
    }

    pub fn flags<I>(mut self, flags: I) -> Self
    where
        I: IntoIterator<Item = FlagDefinition>,
    {
        self.flags.extend(flags);
        self
    }

    /// The command never checks provider credentials
    pub fn without_credentials(mut self) -> Self {
        self.requires_credentials = false;
        self
    }

    pub fn build(self) -> Result<CommandSpec, SpecError> {
        let mut positional = 0;
        for (i, flag) in self.flags.iter().enumerate() {
            if self.flags[..i].iter().any(|f| f.name == flag.name) {
                return Err(SpecError::DuplicateFlag {
                    command: self.name.clone(),
                    flag: flag.name.clone(),
                });
            }

            if flag.required && flag.default.is_some() {
                return Err(SpecError::RequiredWithDefault {
                    command: self.name.clone(),
                    flag: flag.name.clone(),
                });
            }

            if let Some(default) = &flag.default {
                if default.flag_type() != flag.kind {
                    return Err(SpecError::InvalidDefault {
                        command: self.name.clone(),
                        flag: flag.name.clone(),
                        reason: format!("expected {}, got {}", flag.kind, default.flag_type()),
                    });
                }
                if let FlagValue::Str(value) = default {
                    flag.check_choice(value).map_err(|e| SpecError::InvalidDefault {
                        command: self.name.clone(),
                        flag: flag.name.clone(),
                        reason: e.reason().to_string(),
                    })?;
                }
            }

            if flag.positional {
                positional += 1;
            }
        }

        if positional > 1 {
            return Err(SpecError::MultiplePositional { command: self.name });
        }

        Ok(CommandSpec {
            name: self.name,
            flags: self.flags,
            requires_credentials: self.requires_credentials,
        })
    }
}

/// Validated, typed arguments of one invocation
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct InvocationArgs {
    values: BTreeMap<String, FlagValue>,
}

impl InvocationArgs {
    pub fn get(&self, name: &str) -> Option<&FlagValue> {
        self.values.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    pub fn str(&self, name: &str) -> Option<&str> {
        match self.values.get(name) {
            Some(FlagValue::Str(s)) => Some(s.as_str()),
            _ => None,
        }
    }

    /// `true` only when a bool flag is set
    pub fn flag(&self, name: &str) -> bool {
        matches!(self.values.get(name), Some(FlagValue::Bool(true)))
    }

    pub fn int(&self, name: &str) -> Option<i64> {
        match self.values.get(name) {
            Some(FlagValue::Int(n)) => Some(*n),
            _ => None,
        }
    }

    pub fn list(&self, name: &str) -> &[String] {
        match self.values.get(name) {
            Some(FlagValue::List(items)) => items,
            _ => &[],
        }
    }

    /// String value of a flag the hook cannot run without
    pub fn require_str(&self, name: &str) -> Result<&str, ValidationError> {
        self.str(name)
            .ok_or_else(|| ValidationError::new(name, "is required"))
    }

    /// Int value narrowed to `u16` (ports)
    pub fn port(&self, name: &str) -> Result<Option<u16>, ValidationError> {
        self.int(name)
            .map(|n| {
                u16::try_from(n).map_err(|_| {
                    ValidationError::new(name, format!("invalid port: {}", n))
                })
            })
            .transpose()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &FlagValue)> {
        self.values.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_spec() -> CommandSpec {
        CommandSpec::builder("instance create")
            .flag(FlagDefinition::positional("search_pattern"))
            .flag(FlagDefinition::string("instance_type").required())
            .flag(FlagDefinition::string("zone"))
            .flag(FlagDefinition::switch("use_preemptible"))
            .flag(FlagDefinition::int("num_volumes").default_int(1))
            .flag(FlagDefinition::list("regions"))
            .flag(
                FlagDefinition::string("volume_type")
                    .choices(["scratch", "persistent"])
                    .default_str("scratch"),
            )
            .build()
            .unwrap()
    }

    fn raw(pairs: &[(&str, &str)]) -> RawArgs {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_validate_applies_defaults() {
        let spec = create_spec();
        let args = spec
            .validate(&raw(&[("search_pattern", "yb-1"), ("instance_type", "n1-standard-4")]))
            .unwrap();

        assert_eq!(args.str("search_pattern"), Some("yb-1"));
        assert_eq!(args.int("num_volumes"), Some(1));
        assert_eq!(args.str("volume_type"), Some("scratch"));
        assert!(!args.flag("use_preemptible"));
        assert!(args.str("zone").is_none());
        assert!(args.list("regions").is_empty());
    }

    #[test]
    fn test_validate_is_deterministic() {
        let spec = create_spec();
        let input = raw(&[
            ("search_pattern", "yb-1"),
            ("instance_type", "n1"),
            ("regions", "us-west1, us-east1"),
        ]);
        assert_eq!(spec.validate(&input), spec.validate(&input));

        let bad = raw(&[("bogus", "1"), ("zzz", "2")]);
        assert_eq!(spec.validate(&bad), spec.validate(&bad));
    }

    #[test]
    fn test_every_required_flag_is_enforced() {
        let spec = create_spec();
        let full = raw(&[("search_pattern", "yb-1"), ("instance_type", "n1")]);

        for flag in spec.flags().iter().filter(|f| f.required) {
            let mut input = full.clone();
            input.remove(&flag.name);
            let err = spec.validate(&input).unwrap_err();
            assert_eq!(err.flag(), Some(flag.name.as_str()));
            assert_eq!(err.reason(), "is required");
        }
    }

    #[test]
    fn test_unknown_flag_rejected_before_missing() {
        let spec = create_spec();
        let err = spec.validate(&raw(&[("bogus", "1")])).unwrap_err();
        assert_eq!(err.flag(), Some("bogus"));
        assert_eq!(err.reason(), "unrecognized argument");
    }

    #[test]
    fn test_type_and_choice_errors() {
        let spec = create_spec();
        let base = [("search_pattern", "yb-1"), ("instance_type", "n1")];

        let mut input = raw(&base);
        input.insert("num_volumes".into(), "two".into());
        assert_eq!(
            spec.validate(&input).unwrap_err().to_string(),
            "argument --num_volumes: invalid int value: 'two'"
        );

        let mut input = raw(&base);
        input.insert("volume_type".into(), "ssd".into());
        let err = spec.validate(&input).unwrap_err();
        assert_eq!(err.flag(), Some("volume_type"));
        assert!(err.reason().contains("scratch, persistent"));

        let mut input = raw(&base);
        input.insert("use_preemptible".into(), "maybe".into());
        assert_eq!(
            spec.validate(&input).unwrap_err().flag(),
            Some("use_preemptible")
        );
    }

    #[test]
    fn test_list_values_are_split() {
        let spec = create_spec();
        let args = spec
            .validate(&raw(&[
                ("search_pattern", "yb-1"),
                ("instance_type", "n1"),
                ("regions", "us-west1,us-east1"),
            ]))
            .unwrap();
        assert_eq!(args.list("regions"), ["us-west1", "us-east1"]);
    }

    #[test]
    fn test_parse_tokens() {
        let spec = create_spec();
        let tokens = [
            "--instance_type",
            "n1-standard-4",
            "--use_preemptible",
            "yb-node-1",
            "--regions",
            "us-west1",
            "us-east1",
            "--zone=us-west1-a",
        ];
        let raw = spec.parse_tokens(&tokens).unwrap();

        assert_eq!(raw["search_pattern"], "yb-node-1");
        assert_eq!(raw["use_preemptible"], "true");
        assert_eq!(raw["regions"], "us-west1,us-east1");
        assert_eq!(raw["zone"], "us-west1-a");
        assert_eq!(raw["instance_type"], "n1-standard-4");
    }

    #[test]
    fn test_parse_tokens_only_keeps_typed_flags() {
        let spec = create_spec();
        let raw = spec.parse_tokens(&["yb-node-1"]).unwrap();

        // defaults and switches that were not given are filled in by validate
        assert_eq!(raw.len(), 1);
        assert!(!raw.contains_key("use_preemptible"));
        assert!(!raw.contains_key("num_volumes"));
        assert_eq!(
            spec.validate(&raw).unwrap_err().to_string(),
            "argument --instance_type: is required"
        );
    }

    #[test]
    fn test_parse_tokens_errors() {
        let spec = create_spec();

        let err = spec.parse_tokens(&["--zone"]).unwrap_err();
        assert_eq!(err.flag(), Some("zone"));
        assert_eq!(err.reason(), "expected one argument");

        let err = spec.parse_tokens(&["--regions"]).unwrap_err();
        assert_eq!(err.flag(), Some("regions"));
        assert_eq!(err.reason(), "expected at least one argument");

        let err = spec.parse_tokens(&["--zone", "a", "--zone", "b"]).unwrap_err();
        assert_eq!(err.to_string(), "argument --zone: specified more than once");

        let err = spec.parse_tokens(&["--bogus", "1"]).unwrap_err();
        assert_eq!(err.to_string(), "argument --bogus: unrecognized argument");
    }

    #[test]
    fn test_second_bare_token_is_unrecognized() {
        let spec = create_spec();
        let err = spec
            .parse_tokens(&["yb-node-1", "yb-node-2", "--instance_type", "n1"])
            .unwrap_err();

        assert_eq!(err, ValidationError::Unrecognized(vec!["yb-node-2".into()]));
        assert_eq!(err.to_string(), "unrecognized arguments: yb-node-2");
    }

    #[test]
    fn test_bare_token_without_positional() {
        let spec = CommandSpec::builder("query regions")
            .flag(FlagDefinition::string("region"))
            .build()
            .unwrap();

        let err = spec.parse_tokens(&["us-west1"]).unwrap_err();
        assert_eq!(err.flag(), None);
        assert_eq!(err.reason(), "unrecognized arguments");
    }

    #[test]
    fn test_parse_tokens_negative_int() {
        let spec = CommandSpec::builder("x")
            .flag(FlagDefinition::int("custom_ssh_port").default_int(22))
            .build()
            .unwrap();
        let raw = spec.parse_tokens(&["--custom_ssh_port", "-1"]).unwrap();
        assert_eq!(raw["custom_ssh_port"], "-1");
    }

    #[test]
    fn test_spec_invariants() {
        let dup = CommandSpec::builder("x")
            .flag(FlagDefinition::string("zone"))
            .flag(FlagDefinition::string("zone"))
            .build();
        assert!(matches!(dup, Err(SpecError::DuplicateFlag { .. })));

        let required_default = CommandSpec::builder("x")
            .flag(FlagDefinition::string("zone").required().default_str("a"))
            .build();
        assert!(matches!(
            required_default,
            Err(SpecError::RequiredWithDefault { .. })
        ));

        let bad_default = CommandSpec::builder("x")
            .flag(FlagDefinition::string("t").choices(["a"]).default_str("b"))
            .build();
        assert!(matches!(bad_default, Err(SpecError::InvalidDefault { .. })));

        let two_positional = CommandSpec::builder("x")
            .flag(FlagDefinition::positional("a"))
            .flag(FlagDefinition::positional("b"))
            .build();
        assert!(matches!(
            two_positional,
            Err(SpecError::MultiplePositional { .. })
        ));
    }

    #[test]
    fn test_with_flags_keeps_invariants() {
        let spec = create_spec();
        assert!(spec.clone().with_flags([FlagDefinition::string("zone")]).is_err());

        let extended = spec.with_flags([FlagDefinition::switch("use_chrony")]).unwrap();
        assert!(extended.flag("use_chrony").is_some());
        assert!(extended.requires_credentials());
    }

    #[test]
    fn test_port_narrowing() {
        let spec = CommandSpec::builder("x")
            .flag(FlagDefinition::int("custom_ssh_port").default_int(22))
            .build()
            .unwrap();
        let args = spec.validate(&RawArgs::new()).unwrap();
        assert_eq!(args.port("custom_ssh_port").unwrap(), Some(22));

        let args = spec
            .validate(&raw(&[("custom_ssh_port", "70000")]))
            .unwrap();
        assert!(args.port("custom_ssh_port").is_err());
    }
}
