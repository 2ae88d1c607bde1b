//! cloudops list command handler

use cloudops_core::{CommandRegistry, CommandSpec, FlagDefinition};
use colored::Colorize;

fn flag_usage(flag: &FlagDefinition) -> String {
    let mut usage = if flag.positional {
        format!("<{}>", flag.name)
    } else {
        format!("--{} <{}>", flag.name, flag.kind)
    };
    if !flag.required {
        usage = format!("[{}]", usage);
    }
    usage
}

fn flag_detail(flag: &FlagDefinition) -> String {
    let mut detail = flag.help.clone().unwrap_or_default();
    if !flag.choices.is_empty() {
        detail.push_str(&format!(" {{{}}}", flag.choices.join(", ")));
    }
    if let Some(default) = &flag.default {
        let default = serde_json::to_string(default).unwrap_or_default();
        detail.push_str(&format!(" (default: {})", default));
    }
    detail.trim().to_string()
}

fn print_spec(spec: &CommandSpec) {
    let auth = if spec.requires_credentials() {
        String::new()
    } else {
        " (no credentials)".dimmed().to_string()
    };
    println!("  {}{}", spec.name().green().bold(), auth);
    for flag in spec.flags() {
        println!("      {:<36} {}", flag_usage(flag), flag_detail(flag).dimmed());
    }
}

/// `cloudops list`: registered verbs of one provider, or of all of them
pub fn handle_list(
    registry: &CommandRegistry,
    provider: Option<&str>,
    json: bool,
) -> anyhow::Result<()> {
    let providers: Vec<&str> = match provider {
        Some(name) if registry.providers().contains(&name) => vec![name],
        Some(name) => anyhow::bail!("Unknown provider: {}", name),
        None => registry.providers(),
    };

    if json {
        let listing: serde_json::Map<String, serde_json::Value> = providers
            .iter()
            .map(|p| -> serde_json::Result<(String, serde_json::Value)> {
                let specs: Vec<&CommandSpec> = registry.commands(p).map(|c| c.spec()).collect();
                Ok((p.to_string(), serde_json::to_value(specs)?))
            })
            .collect::<serde_json::Result<_>>()?;
        println!("{}", serde_json::to_string_pretty(&listing)?);
        return Ok(());
    }

    for name in providers {
        println!("{} {}", "Provider:".bold(), name.cyan().bold());
        for command in registry.commands(name) {
            print_spec(command.spec());
        }
        println!();
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use cloudops_core::FlagDefinition;

    #[test]
    fn test_flag_usage() {
        assert_eq!(
            flag_usage(&FlagDefinition::positional("search_pattern")),
            "<search_pattern>"
        );
        assert_eq!(
            flag_usage(&FlagDefinition::string("zone")),
            "[--zone <string>]"
        );
        assert_eq!(
            flag_usage(&FlagDefinition::string("instance_type").required()),
            "--instance_type <string>"
        );
    }

    #[test]
    fn test_flag_detail() {
        let flag = FlagDefinition::string("volume_type")
            .choices(["scratch", "persistent"])
            .default_str("scratch")
            .help("Storage type");
        assert_eq!(
            flag_detail(&flag),
            "Storage type {scratch, persistent} (default: \"scratch\")"
        );
        assert_eq!(flag_detail(&FlagDefinition::string("zone")), "");
    }
}
