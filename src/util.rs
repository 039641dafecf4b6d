use std::net::IpAddr;
use std::path::PathBuf;

use tracing::warn;

const AGENT_ADDR: &str = "AGENT_ADDR";

const AGENT_PORT: &str = "AGENT_PORT";

const COMPOSE_PATH: &str = "COMPOSE_PATH";

fn parse_env<T: std::str::FromStr>(name: &str) -> Option<T> {
    let value = std::env::var(name).ok()?;
    value
        .parse()
        .inspect_err(|_| warn!("ignoring unparsable {name}={value}"))
        .ok()
}

pub fn get_addr() -> Option<IpAddr> {
    parse_env(AGENT_ADDR)
}

pub fn get_port() -> Option<u16> {
    parse_env(AGENT_PORT)
}

pub fn get_compose_path() -> Option<PathBuf> {
    std::env::var_os(COMPOSE_PATH).map(PathBuf::from)
}
