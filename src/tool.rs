use serde::Serialize;

/// Verbs routed to the bound executable without the leading invocation name.
/// Kept sorted for `binary_search`.
pub const TOOL_VERBS: &[&str] = &[
    "adminrole",
    "alert",
    "alias",
    "browser",
    "building",
    "chatevent",
    "chatmember",
    "chatmessage",
    "chatspace",
    "chromeapp",
    "chromeprofile",
    "chromeprofilecommand",
    "chromeschema",
    "cigroup",
    "cigroupmembers",
    "contact",
    "course",
    "courses",
    "cros",
    "crostelemetry",
    "currentprojectid",
    "customer",
    "datatransfer",
    "device",
    "deviceuser",
    "deviceuserstate",
    "domain",
    "domainalias",
    "domaincontact",
    "drivefileacl",
    "drivelabel",
    "group",
    "groupmembers",
    "inboundssoassignment",
    "inboundssocredential",
    "inboundssoprofile",
    "instance",
    "mobile",
    "org",
    "orgs",
    "peoplecontact",
    "peopleprofile",
    "policy",
    "printer",
    "resoldcustomer",
    "resoldsubscription",
    "resource",
    "resources",
    "schema",
    "shareddrive",
    "site",
    "siteacl",
    "user",
    "userinvitation",
    "users",
    "vaultexport",
    "vaulthold",
    "vaultmatter",
    "vaultquery",
    "verify",
];

pub fn is_tool_verb(root: &str) -> bool {
    TOOL_VERBS.binary_search(&root).is_ok()
}

/// How the external tool is laid out inside an environment folder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ToolBinding {
    /// Lower-case first token that explicitly addresses the tool.
    pub invocation: String,
    /// File name of the executable at the environment root.
    pub executable: String,
    /// Variable pointing the tool at its configuration directory.
    pub config_env_var: String,
    pub config_dir: String,
    pub cache_dirs: Vec<String>,
    pub token_files: Vec<String>,
}

impl Default for ToolBinding {
    fn default() -> Self {
        let executable = if cfg!(windows) { "gam.exe" } else { "gam" };
        Self {
            invocation: "gam".to_string(),
            executable: executable.to_string(),
            config_env_var: "GAMCFGDIR".to_string(),
            config_dir: ".gam".to_string(),
            cache_dirs: vec!["gamcache".to_string(), "drive".to_string()],
            token_files: vec!["oauth2.txt".to_string(), "oauth2service.json".to_string()],
        }
    }
}

impl ToolBinding {
    pub fn with_executable(mut self, executable: impl Into<String>) -> Self {
        self.executable = executable.into();
        self
    }
}
