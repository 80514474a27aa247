use std::collections::{BTreeMap, BTreeSet};

use super::{ChannelRelease, Confinement, InstalledPackage, PackageError, PackageInfo};

const CHANNELS_HEADER: &str = "channels:";
const CONFINEMENT_KEY: &str = "confinement:";
const CLOSED_CHANNEL_MARKERS: [&str; 3] = ["↑", "–", "--"];
const NOT_CONNECTED: &str = "-";
const ACTIVE_SERVICE: &str = "active";

/// Parses the output of `snap info --verbose <name>`.
pub fn parse_info(output: &str) -> Result<PackageInfo, PackageError> {
    let mut info = PackageInfo::default();
    let mut in_channels = false;
    let mut has_classic_release = false;

    for line in output.lines() {
        let trimmed = line.trim();

        if trimmed.starts_with(CONFINEMENT_KEY) {
            info.confinement = parse_confinement(trimmed.trim_start_matches(CONFINEMENT_KEY));
            continue;
        }
        if trimmed == CHANNELS_HEADER {
            in_channels = true;
            continue;
        }
        // channel entries are the indented lines right after the header
        if in_channels {
            if !line.starts_with(' ') {
                in_channels = false;
                continue;
            }
            if let Some((channel, release, classic)) = parse_channel_line(trimmed) {
                has_classic_release |= classic;
                info.channels.insert(channel, release);
            }
        }
    }

    if info.confinement == Confinement::Strict && has_classic_release {
        info.confinement = Confinement::Classic;
    }
    if info.channels.is_empty() && !output.contains(CHANNELS_HEADER) {
        return Err(PackageError::UnexpectedOutput(
            "no channel information in snap info".to_string(),
        ));
    }
    Ok(info)
}

fn parse_confinement(value: &str) -> Confinement {
    match value.trim() {
        "classic" => Confinement::Classic,
        "devmode" => Confinement::Devmode,
        _ => Confinement::Strict,
    }
}

// `latest/stable:    1.8.2 2024-10-21 (1904) 7MB classic`
fn parse_channel_line(line: &str) -> Option<(String, ChannelRelease, bool)> {
    let (channel, rest) = line.split_once(':')?;
    if !channel.contains('/') {
        return None;
    }
    let fields: Vec<&str> = rest.split_whitespace().collect();
    let version = fields.first()?;
    if CLOSED_CHANNEL_MARKERS.contains(version) {
        return None;
    }
    let revision: u64 = fields
        .iter()
        .find(|f| f.starts_with('(') && f.ends_with(')'))
        .and_then(|f| f.trim_matches(|c| c == '(' || c == ')').parse().ok())?;
    let classic = fields.last().is_some_and(|notes| notes.contains("classic"));

    Some((
        channel.trim().to_string(),
        ChannelRelease {
            version: version.to_string(),
            revision,
        },
        classic,
    ))
}

/// Parses the output of `snap list <name>`; `None` when the package is not in the list.
pub fn parse_list(output: &str, name: &str) -> Option<InstalledPackage> {
    output
        .lines()
        .skip(1)
        .map(|line| line.split_whitespace().collect::<Vec<_>>())
        .find(|fields| fields.first() == Some(&name))
        .and_then(|fields| {
            Some(InstalledPackage {
                version: fields.get(1)?.to_string(),
                revision: fields.get(2)?.to_string(),
                tracking: fields
                    .get(3)
                    .filter(|t| **t != NOT_CONNECTED)
                    .map(|t| t.to_string()),
            })
        })
}

/// Parses the output of `snap services <name>` into service name to "is active".
pub fn parse_services(output: &str) -> BTreeMap<String, bool> {
    output
        .lines()
        .skip(1)
        .filter_map(|line| {
            let fields: Vec<&str> = line.split_whitespace().collect();
            let service = fields.first()?;
            let current = fields.get(2)?;
            Some((service.to_string(), *current == ACTIVE_SERVICE))
        })
        .collect()
}

/// Parses the output of `snap connections <name>` into the plugs of `name` connected to a slot.
pub fn parse_connections(output: &str, name: &str) -> BTreeSet<String> {
    let prefix = format!("{name}:");
    output
        .lines()
        .skip(1)
        .filter_map(|line| {
            let fields: Vec<&str> = line.split_whitespace().collect();
            let plug = fields.get(1)?.strip_prefix(prefix.as_str())?;
            let slot = fields.get(2)?;
            (*slot != NOT_CONNECTED).then(|| plug.to_string())
        })
        .collect()
}
