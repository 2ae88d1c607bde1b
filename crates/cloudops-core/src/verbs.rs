//! Lifecycle verb names and their provider-independent specs
//!
//! Providers start from these base specs and extend them in
//! [`crate::Phases::add_extra_args`].

use crate::error::SpecError;
use crate::spec::{CommandSpec, CommandSpecBuilder, FlagDefinition};

pub const INSTANCE_CREATE: &str = "instance create";
pub const INSTANCE_PROVISION: &str = "instance provision";
pub const INSTANCE_CREATE_ROOT_VOLUMES: &str = "instance create_root_volumes";
pub const INSTANCE_REPLACE_ROOT_VOLUME: &str = "instance replace_root_volume";
pub const INSTANCE_DESTROY: &str = "instance destroy";
pub const INSTANCE_CHANGE_TYPE: &str = "instance change_instance_type";
pub const INSTANCE_PAUSE: &str = "instance pause";
pub const INSTANCE_RESUME: &str = "instance resume";

pub const QUERY_REGIONS: &str = "query regions";
pub const QUERY_VPC: &str = "query vpc";
pub const QUERY_ZONES: &str = "query zones";
pub const QUERY_INSTANCE_TYPES: &str = "query instance_types";
pub const QUERY_CURRENT_HOST: &str = "query current-host";
pub const QUERY_SPOT_PRICING: &str = "query spot-pricing";

pub const NETWORK_BOOTSTRAP: &str = "network bootstrap";
pub const NETWORK_CLEANUP: &str = "network cleanup";
pub const NETWORK_QUERY: &str = "network query";

/// Default SSH port handed to `start_instance`
pub const DEFAULT_SSH_PORT: i64 = 22;

/// `--region` and `--zone`, accepted by every verb
pub fn common_flags() -> Vec<FlagDefinition> {
    vec![
        FlagDefinition::string("region").help("Region to act in"),
        FlagDefinition::string("zone").help("Zone to act in"),
    ]
}

fn instance_command(name: &str) -> CommandSpecBuilder {
    CommandSpec::builder(name)
        .flag(FlagDefinition::positional("search_pattern").help("Instance name or pattern"))
        .flags(common_flags())
}

pub fn create_instance() -> Result<CommandSpec, SpecError> {
    instance_command(INSTANCE_CREATE)
        .flag(FlagDefinition::string("instance_type").required())
        .flag(FlagDefinition::string("machine_image").help("Image to boot from"))
        .flag(FlagDefinition::string("cloud_subnet"))
        .flag(FlagDefinition::switch("assign_public_ip"))
        .flag(FlagDefinition::switch("assign_static_public_ip"))
        .flag(FlagDefinition::int("boot_disk_size_gb"))
        .flag(FlagDefinition::int("num_volumes").default_int(1))
        .flag(FlagDefinition::int("volume_size").default_int(250))
        .flag(FlagDefinition::string("type").default_str("cluster-server").help("Server type"))
        .flag(FlagDefinition::string("private_key_file"))
        .flag(FlagDefinition::list("instance_tags"))
        .build()
}

pub fn provision_instance() -> Result<CommandSpec, SpecError> {
    instance_command(INSTANCE_PROVISION)
        .flag(FlagDefinition::string("instance_type"))
        .flag(FlagDefinition::int("num_volumes").default_int(1))
        .build()
}

pub fn create_root_volumes() -> Result<CommandSpec, SpecError> {
    instance_command(INSTANCE_CREATE_ROOT_VOLUMES)
        .flag(FlagDefinition::string("machine_image"))
        .flag(FlagDefinition::int("boot_disk_size_gb"))
        .flag(FlagDefinition::list("instance_tags"))
        .flag(FlagDefinition::int("num_disks").default_int(1))
        .build()
}

pub fn replace_root_volume() -> Result<CommandSpec, SpecError> {
    instance_command(INSTANCE_REPLACE_ROOT_VOLUME)
        .flag(FlagDefinition::string("replacement_disk").required())
        .flag(FlagDefinition::int("custom_ssh_port").default_int(DEFAULT_SSH_PORT))
        .build()
}

pub fn destroy_instance() -> Result<CommandSpec, SpecError> {
    instance_command(INSTANCE_DESTROY)
        .flag(FlagDefinition::string("node_ip"))
        .flag(FlagDefinition::switch("delete_static_public_ip"))
        .build()
}

pub fn change_instance_type() -> Result<CommandSpec, SpecError> {
    instance_command(INSTANCE_CHANGE_TYPE)
        .flag(FlagDefinition::string("instance_type").required())
        .flag(FlagDefinition::string("node_ip"))
        .build()
}

pub fn pause_instance() -> Result<CommandSpec, SpecError> {
    instance_command(INSTANCE_PAUSE).build()
}

pub fn resume_instance() -> Result<CommandSpec, SpecError> {
    instance_command(INSTANCE_RESUME)
        .flag(FlagDefinition::int("custom_ssh_port").default_int(DEFAULT_SSH_PORT))
        .build()
}

/// Base spec of a query or network verb
pub fn query(name: &str) -> Result<CommandSpec, SpecError> {
    CommandSpec::builder(name).flags(common_flags()).build()
}

/// `query current-host` reads local metadata and never checks credentials
pub fn current_host() -> Result<CommandSpec, SpecError> {
    CommandSpec::builder(QUERY_CURRENT_HOST)
        .flags(common_flags())
        .without_credentials()
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_specs_are_valid() {
        let specs = [
            create_instance(),
            provision_instance(),
            create_root_volumes(),
            replace_root_volume(),
            destroy_instance(),
            change_instance_type(),
            pause_instance(),
            resume_instance(),
            query(QUERY_REGIONS),
            current_host(),
        ];

        for spec in specs {
            let spec = spec.unwrap();
            assert!(spec.flag("region").is_some(), "{} lacks --region", spec.name());
        }
    }

    #[test]
    fn test_current_host_skips_credentials() {
        assert!(!current_host().unwrap().requires_credentials());
        assert!(query(QUERY_REGIONS).unwrap().requires_credentials());
    }

    #[test]
    fn test_instance_verbs_take_search_pattern() {
        let spec = destroy_instance().unwrap();
        assert_eq!(spec.positional().map(|f| f.name.as_str()), Some("search_pattern"));
        assert!(query(QUERY_ZONES).unwrap().positional().is_none());
    }
}
