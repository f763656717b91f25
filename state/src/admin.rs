//! Admin service (§4.11): loads admin groups/members from one or more
//! sources and refreshes them on an interval, exposing `hasPermission`.
//!
//! §6 fixes the on-disk grammar (`Group=`/`Admin=` lines, `//`/`#`
//! comments) but leaves the transport for "remote URL"/"remote FS path"
//! sources to the host process. Rather than pull an HTTP or SFTP client
//! into this crate for that, a non-local source is just an injected
//! fetch closure — the same seam `host-api` later uses to keep
//! `plugin-host` decoupled from concrete transports.

use std::collections::HashSet;
use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Arc;

use domain::admin::{AdminGroup, AdminRoster};
use domain::error::{ErrorContext, SupervisorError};

pub type Fetch = Arc<dyn Fn() -> Pin<Box<dyn Future<Output = Result<String, SupervisorError>> + Send>> + Send + Sync>;

pub enum AdminSource {
    Local(PathBuf),
    Remote(Fetch),
}

impl AdminSource {
    pub fn local(path: impl Into<PathBuf>) -> Self {
        AdminSource::Local(path.into())
    }

    pub fn remote<F, Fut>(fetch: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<String, SupervisorError>> + Send + 'static,
    {
        AdminSource::Remote(Arc::new(move || Box::pin(fetch())))
    }

    async fn load(&self) -> Result<String, SupervisorError> {
        match self {
            AdminSource::Local(path) => tokio::fs::read_to_string(path).await.map_err(|e| SupervisorError::ReadFailed {
                message: e.to_string(),
                context: {
                    let mut ctx = ErrorContext::new();
                    ctx.insert("path".to_string(), path.display().to_string());
                    ctx
                },
            }),
            AdminSource::Remote(fetch) => fetch().await,
        }
    }
}

/// Parses the admin-list grammar from §6. Unknown lines are collected as
/// warnings rather than rejected outright — the format tolerates garbage
/// lines from hand-edited files.
pub fn parse_admin_list(text: &str) -> (AdminRoster, Vec<String>) {
    let mut roster = AdminRoster::new();
    let mut warnings = Vec::new();

    for raw_line in text.lines() {
        let line = raw_line.trim();
        if line.is_empty() || line.starts_with("//") || line.starts_with('#') {
            continue;
        }

        if let Some(rest) = line.strip_prefix("Group=") {
            match rest.split_once(':') {
                Some((name, perms)) => {
                    let permissions: HashSet<String> = perms.split(',').map(|p| p.trim().to_string()).filter(|p| !p.is_empty()).collect();
                    roster.add_group(AdminGroup {
                        name: name.trim().to_string(),
                        permissions,
                    });
                }
                None => warnings.push(format!("malformed Group line: {raw_line}")),
            }
        } else if let Some(rest) = line.strip_prefix("Admin=") {
            match rest.split_once(':') {
                Some((identity, group)) => {
                    roster.add_membership(identity.trim().to_string(), group.trim().to_string());
                }
                None => warnings.push(format!("malformed Admin line: {raw_line}")),
            }
        } else {
            warnings.push(format!("unrecognized admin list line: {raw_line}"));
        }
    }

    (roster, warnings)
}

#[derive(Default)]
pub struct AdminService {
    sources: Vec<AdminSource>,
    roster: AdminRoster,
}

impl AdminService {
    pub fn new(sources: Vec<AdminSource>) -> Self {
        Self { sources, roster: AdminRoster::new() }
    }

    pub fn has_permission(&self, identity: &str, permission: &str) -> bool {
        self.roster.has_permission(identity, permission)
    }

    pub fn roster(&self) -> &AdminRoster {
        &self.roster
    }

    /// Reloads every source and merges them into one roster. A failing
    /// source is logged and skipped — admin list loading is explicitly
    /// non-fatal (§4.12 step 2) — so one unreachable remote source never
    /// blocks the others from refreshing.
    pub async fn refresh(&mut self) {
        let mut merged = AdminRoster::new();
        for source in &self.sources {
            match source.load().await {
                Ok(text) => {
                    let (roster, warnings) = parse_admin_list(&text);
                    for warning in &warnings {
                        tracing::warn!(warning, "admin list parse issue");
                    }
                    merge_roster(&mut merged, roster);
                }
                Err(err) => {
                    tracing::warn!(error = %err, "admin source failed to load, skipping");
                }
            }
        }
        self.roster = merged;
    }
}

fn merge_roster(into: &mut AdminRoster, from: AdminRoster) {
    for group in from.all_groups() {
        into.add_group(group.clone());
    }
    for (identity, group_name) in from.all_memberships() {
        into.add_membership(identity, group_name);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_groups_and_memberships_and_skips_comments() {
        let text = "\
// comment
Group=mod:kick,warn
Group=banner:ban
Admin=76561198012345678:mod
Admin=76561198012345678:banner
# another comment
garbage line
";
        let (roster, warnings) = parse_admin_list(text);
        assert!(roster.has_permission("76561198012345678", "kick"));
        assert!(roster.has_permission("76561198012345678", "ban"));
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("garbage line"));
    }

    #[tokio::test]
    async fn refresh_merges_multiple_sources_and_tolerates_a_failing_one() {
        let mut service = AdminService::new(vec![
            AdminSource::remote(|| async { Ok("Group=mod:kick\nAdmin=76561198012345678:mod\n".to_string()) }),
            AdminSource::remote(|| async {
                Err(SupervisorError::ReadFailed {
                    message: "unreachable".to_string(),
                    context: ErrorContext::new(),
                })
            }),
        ]);
        service.refresh().await;
        assert!(service.has_permission("76561198012345678", "kick"));
    }
}
