pub const DEFAULT_CONFIG: &str = "config/lifecycle.yml";
/// Prefix of the directory a Terraform folder is copied into when `copy_to_temp` is set
pub const TEMP_DIR_PREFIX: &str = "deploycheck";
