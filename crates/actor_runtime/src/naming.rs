//! Hierarchical names
//!
//! Each actor keeps its own `name -> address` table. A path such as
//! `/a/b/c` is resolved one segment at a time by asking the current actor
//! for the next name, using a temporary port as the reply address.

use crate::{
    address::Address,
    error::{ActorError, ActorResult},
    mailbox::Signal,
    system::System,
};
use std::collections::HashMap;

/// Reply to a name lookup that succeeded
#[derive(Debug, Clone)]
pub(crate) struct FoundName {
    pub name: String,
    pub who: Address,
}

/// Reply to a name lookup that failed
#[derive(Debug, Clone)]
pub(crate) struct NoSuchName {
    pub name: String,
}

/// Naming table of the resolving actor, consulted directly instead of
/// sending itself a lookup it could not answer mid-invocation
pub(crate) struct LocalNames<'a> {
    pub owner: Address,
    pub names: &'a HashMap<String, Address>,
}

/// Split a path into (is_absolute, segments). `/` alone is the root.
pub fn split_path(path: &str) -> ActorResult<(bool, Vec<String>)> {
    let invalid = || ActorError::InvalidPath {
        path: path.to_string(),
    };

    if path.is_empty() {
        return Err(invalid());
    }

    let (absolute, rest) = match path.strip_prefix('/') {
        Some(rest) => (true, rest),
        None => (false, path),
    };
    if rest.is_empty() {
        return if absolute { Ok((true, Vec::new())) } else { Err(invalid()) };
    }

    let segments: Vec<String> = rest.split('/').map(str::to_owned).collect();
    if segments.iter().any(String::is_empty) {
        return Err(invalid());
    }
    Ok((absolute, segments))
}

/// Walk `segments` starting at `start`
pub(crate) async fn resolve(
    system: &System,
    start: Address,
    segments: &[String],
    path: &str,
    local: Option<LocalNames<'_>>,
) -> ActorResult<Address> {
    let timeout = system.config().lookup_timeout();
    let not_found = |segment: &str| ActorError::NameNotFound {
        path: path.to_string(),
        segment: segment.to_string(),
    };

    let mut port = None;
    let mut current = start;
    for segment in segments {
        if let Some(local) = local.as_ref().filter(|l| l.owner == current) {
            current = *local.names.get(segment).ok_or_else(|| not_found(segment))?;
            continue;
        }

        let port = port.get_or_insert_with(|| system.new_port());
        let request = Signal::LookupName {
            name: segment.clone(),
            reply_to: port.address(),
        };
        if system.signal(current, request).is_err() {
            return Err(not_found(segment));
        }

        let reply = port.receive_timeout(timeout).await?;
        let reply = match reply.downcast::<FoundName>() {
            Ok(found) => {
                current = found.who;
                continue;
            }
            Err(reply) => reply,
        };
        return match reply.downcast::<NoSuchName>() {
            Ok(missing) => Err(not_found(&missing.name)),
            Err(other) => Err(ActorError::UnexpectedReply {
                expected: "name lookup reply".to_string(),
                received: other.message_type().to_string(),
            }),
        };
    }

    Ok(current)
}

/// Build the path of `address` from the labels of it and its ancestors.
/// An unlabelled ancestor, or a parentless actor other than the root, shows
/// up as its address.
pub(crate) fn path_of(system: &System, address: Address) -> String {
    let mut parts = Vec::new();
    let mut current = Some(address);

    while let Some(addr) = current {
        let Some(cell) = system.registry().actor(addr) else {
            if system.root() != Some(addr) {
                parts.push(addr.to_string());
            }
            break;
        };
        if cell.parent.is_none() {
            if system.root() != Some(addr) {
                parts.push(addr.to_string());
            }
            break;
        }
        let label = cell.label.read().clone();
        parts.push(label.unwrap_or_else(|| addr.to_string()));
        current = cell.parent;
    }

    parts.reverse();
    format!("/{}", parts.join("/"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        system::SpawnOptions,
        testing::{NameChain, Silent},
    };

    #[tokio::test]
    async fn test_path_of_top_level_actors() {
        let system = System::new();
        let root = system.spawn(NameChain::new(&["a"]));
        let other = system.spawn(Silent);
        let child = system.spawn_with(Silent, SpawnOptions::new().with_parent(other));

        assert_eq!(path_of(&system, root), "/");
        assert_eq!(path_of(&system, other), format!("/{}", other));
        assert_eq!(path_of(&system, child), format!("/{}/{}", other, child));

        // Start runs before the lookup request, so the child is registered.
        let a = system.lookup("/a").await.unwrap();
        assert_eq!(path_of(&system, a), "/a");
    }

    #[test]
    fn test_split_path() {
        assert_eq!(split_path("/").unwrap(), (true, vec![]));
        assert_eq!(
            split_path("/a/b/c").unwrap(),
            (true, vec!["a".to_string(), "b".to_string(), "c".to_string()])
        );
        assert_eq!(split_path("child").unwrap(), (false, vec!["child".to_string()]));

        for bad in ["", "//", "/a//b", "/a/", "a/"] {
            assert!(
                matches!(split_path(bad), Err(ActorError::InvalidPath { .. })),
                "{:?} should be rejected",
                bad
            );
        }
    }
}
