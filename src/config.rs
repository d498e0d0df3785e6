use std::env;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::path::PathBuf;

use tracing::warn;

use crate::allocator::{AllocationConfig, OccupancyUpdate, ShortagePolicy};
use crate::model::CategoryTags;
use crate::orchestrator::RunConfig;
use crate::store::JsonFileStore;

/// Complete application configuration, loaded from environment variables or default values.
#[derive(Clone, Debug)]
pub struct AppConfig {
    pub api: ApiConfig,
    pub store: StoreConfig,
    pub manifest: ManifestConfig,
}

impl AppConfig {
    /// Creates a configuration from the currently available environment variables.
    pub fn from_env() -> Self {
        Self {
            api: ApiConfig::from_env(),
            store: StoreConfig::from_env(),
            manifest: ManifestConfig::from_env(),
        }
    }
}

/// Configuration for the API server.
#[derive(Clone, Debug)]
pub struct ApiConfig {
    bind_ip: IpAddr,
    display_host: String,
    port: u16,
}

impl ApiConfig {
    const DEFAULT_HOST: &'static str = "0.0.0.0";
    const DEFAULT_PORT: u16 = 8080;

    fn from_env() -> Self {
        let host_value =
            env_string("BOX_MANIFEST_API_HOST").unwrap_or_else(|| Self::DEFAULT_HOST.to_string());
        let (bind_ip, display_host) = match host_value.parse::<IpAddr>() {
            Ok(ip) => (ip, host_value),
            Err(err) => {
                warn!(
                    "⚠️ Could not parse BOX_MANIFEST_API_HOST ('{}'): {}. Using {}.",
                    host_value,
                    err,
                    Self::DEFAULT_HOST
                );
                (
                    IpAddr::V4(Ipv4Addr::UNSPECIFIED),
                    Self::DEFAULT_HOST.to_string(),
                )
            }
        };

        let port = env_string("BOX_MANIFEST_API_PORT")
            .and_then(|raw| parse_port(&raw, "BOX_MANIFEST_API_PORT"))
            .unwrap_or(Self::DEFAULT_PORT);

        Self {
            bind_ip,
            display_host,
            port,
        }
    }

    /// Socket address to bind the server to.
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_ip, self.port)
    }

    /// Visible hostname for logging and hints.
    pub fn display_host(&self) -> &str {
        &self.display_host
    }

    /// Configured port.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Indicates whether binding to all interfaces.
    pub fn binds_to_all_interfaces(&self) -> bool {
        match self.bind_ip {
            IpAddr::V4(addr) => addr == Ipv4Addr::UNSPECIFIED,
            IpAddr::V6(addr) => addr == Ipv6Addr::UNSPECIFIED,
        }
    }

    /// Checks whether the hostname matches the default value.
    pub fn uses_default_host(&self) -> bool {
        self.display_host == Self::DEFAULT_HOST
    }
}

/// Location of the order table and of the manifest.
#[derive(Clone, Debug)]
pub struct StoreConfig {
    input_path: PathBuf,
    output_path: PathBuf,
}

impl StoreConfig {
    const DEFAULT_INPUT: &'static str = "orders.json";
    const DEFAULT_OUTPUT: &'static str = "manifest.json";

    fn from_env() -> Self {
        Self {
            input_path: env_string("BOX_MANIFEST_INPUT_PATH")
                .unwrap_or_else(|| Self::DEFAULT_INPUT.to_string())
                .into(),
            output_path: env_string("BOX_MANIFEST_OUTPUT_PATH")
                .unwrap_or_else(|| Self::DEFAULT_OUTPUT.to_string())
                .into(),
        }
    }

    /// Opens the file store at the configured locations.
    pub fn open(&self) -> JsonFileStore {
        JsonFileStore::new(&self.input_path, &self.output_path)
    }
}

/// Table layout and allocation behaviour of manifest runs.
#[derive(Clone, Debug)]
pub struct ManifestConfig {
    run: RunConfig,
}

impl ManifestConfig {
    const HAS_HEADER_VAR: &'static str = "BOX_MANIFEST_INPUT_HAS_HEADER";
    const BOX_COUNT_TAG_VAR: &'static str = "BOX_MANIFEST_BOX_COUNT_TAG";
    const FILLER_TAG_VAR: &'static str = "BOX_MANIFEST_FILLER_TAG";
    const PLACEMENT_TAG_VAR: &'static str = "BOX_MANIFEST_PLACEMENT_TAG";
    const OCCUPANCY_VAR: &'static str = "BOX_MANIFEST_OCCUPANCY_UPDATE";
    const SHORTAGE_VAR: &'static str = "BOX_MANIFEST_SHORTAGE_POLICY";

    fn from_env() -> Self {
        let defaults = RunConfig::default();

        let has_header = env_string(Self::HAS_HEADER_VAR)
            .and_then(|raw| parse_bool(&raw, Self::HAS_HEADER_VAR))
            .unwrap_or(defaults.has_header);

        let tags = CategoryTags::new(
            env_string(Self::BOX_COUNT_TAG_VAR).unwrap_or(defaults.tags.box_count),
            env_string(Self::FILLER_TAG_VAR).unwrap_or(defaults.tags.filler),
        );

        let placement_tag =
            env_string(Self::PLACEMENT_TAG_VAR).unwrap_or(defaults.placement_tag);

        let occupancy_update = load_choice(
            Self::OCCUPANCY_VAR,
            OccupancyUpdate::default(),
            OccupancyUpdate::from_name,
            "additive, overwrite",
        );
        if occupancy_update == OccupancyUpdate::Overwrite {
            warn!(
                "⚠️ Box occupation is overwritten on split placements; boxes may be reported emptier than they are ({} = overwrite).",
                Self::OCCUPANCY_VAR
            );
        }

        let shortage_policy = load_choice(
            Self::SHORTAGE_VAR,
            ShortagePolicy::default(),
            ShortagePolicy::from_name,
            "report, fail",
        );

        let allocation = AllocationConfig::builder()
            .occupancy_update(occupancy_update)
            .shortage_policy(shortage_policy)
            .build();

        Self {
            run: RunConfig {
                tags,
                placement_tag,
                has_header,
                allocation,
            },
        }
    }

    /// Returns the configured run settings.
    pub fn run_config(&self) -> RunConfig {
        self.run.clone()
    }
}

fn env_string(name: &str) -> Option<String> {
    match env::var(name) {
        Ok(value) => {
            let trimmed = value.trim();
            if trimmed.is_empty() {
                None
            } else {
                Some(trimmed.to_owned())
            }
        }
        Err(env::VarError::NotPresent) => None,
        Err(err) => {
            warn!(
                "⚠️ Access to {} failed: {}. Using default value.",
                name, err
            );
            None
        }
    }
}

fn parse_bool(raw: &str, var_name: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "y" | "on" => Some(true),
        "0" | "false" | "no" | "n" | "off" => Some(false),
        other => {
            warn!(
                "⚠️ Could not interpret {} ('{}') as boolean value. Using default value.",
                var_name, other
            );
            None
        }
    }
}

fn parse_port(raw: &str, var_name: &str) -> Option<u16> {
    match raw.trim().parse::<u16>() {
        Ok(0) => {
            warn!("⚠️ {} must not be 0. Using default port.", var_name);
            None
        }
        Ok(port) => Some(port),
        Err(err) => {
            warn!(
                "⚠️ Could not parse {} ('{}'): {}. Using default port.",
                var_name, raw, err
            );
            None
        }
    }
}

fn load_choice<T: std::fmt::Debug>(
    var_name: &str,
    default: T,
    parse: impl Fn(&str) -> Option<T>,
    expected: &str,
) -> T {
    match env_string(var_name) {
        Some(raw) => match parse(&raw) {
            Some(value) => value,
            None => {
                warn!(
                    "⚠️ {} contains invalid value '{}' (expected one of: {}). Using {:?}.",
                    var_name, raw, expected, default
                );
                default
            }
        },
        None => default,
    }
}
