use std::collections::HashSet;
use std::path::PathBuf;

pub fn args() -> Vec<String> {
    std::env::args().skip(1).collect()
}

pub fn arg_value(args: &[String], name: &str) -> Option<String> {
    let prefix = format!("--{name}=");
    let bare = format!("--{name}");
    for (idx, arg) in args.iter().enumerate() {
        if let Some(raw) = arg.strip_prefix(&prefix) {
            let trimmed = raw.trim();
            if !trimmed.is_empty() {
                return Some(trimmed.to_string());
            }
        }
        if *arg == bare
            && let Some(next) = args.get(idx + 1)
            && !next.trim().is_empty()
            && !next.starts_with("--")
        {
            return Some(next.trim().to_string());
        }
    }
    None
}

/// Every value given for a repeatable flag, in order.
pub fn arg_values(args: &[String], name: &str) -> Vec<String> {
    let prefix = format!("--{name}=");
    let bare = format!("--{name}");
    let mut out = Vec::new();
    for (idx, arg) in args.iter().enumerate() {
        if let Some(raw) = arg.strip_prefix(&prefix) {
            if !raw.trim().is_empty() {
                out.push(raw.trim().to_string());
            }
        } else if *arg == bare
            && let Some(next) = args.get(idx + 1)
            && !next.starts_with("--")
        {
            out.push(next.trim().to_string());
        }
    }
    out
}

pub fn has_flag(args: &[String], name: &str) -> bool {
    let bare = format!("--{name}");
    args.iter().any(|a| *a == bare)
}

pub fn path_arg(args: &[String], name: &str) -> Option<PathBuf> {
    arg_value(args, name).map(PathBuf::from)
}

pub fn parse_ids(raw: &str) -> Vec<u32> {
    let mut seen = HashSet::new();
    raw.split([',', ';', ' '])
        .filter_map(|part| part.trim().parse::<u32>().ok())
        .filter(|id| *id != 0)
        .filter(|id| seen.insert(*id))
        .collect()
}
