//! Origin and channel policy
//!
//! Origin checking is the only access control on this transport. Both
//! policies are built once and never mutated afterwards.

use ahash::AHashSet;
use bus::ChannelId;
use url::Url;

use crate::error::{Result, WindowError};
use crate::window::{BrowsingContext, ANY_ORIGIN};

/// Serialise `raw` as a web origin (`scheme://host[:port]`)
///
/// `*` passes through untouched. Opaque origins (`data:`, `file:`...) are
/// rejected because a browser reports them as `"null"`.
pub fn normalize_origin(raw: &str) -> Result<String> {
    let raw = raw.trim();
    if raw == ANY_ORIGIN {
        return Ok(ANY_ORIGIN.to_string());
    }

    let url = Url::parse(raw).map_err(|_| WindowError::InvalidOrigin(raw.to_string()))?;
    let origin = url.origin();
    if !origin.is_tuple() {
        return Err(WindowError::InvalidOrigin(raw.to_string()));
    }
    Ok(origin.ascii_serialization())
}

/// Best guess at the peer's origin: referrer first, then nearest ancestor
pub fn derive_peer_origin<C: BrowsingContext + ?Sized>(context: &C) -> Option<String> {
    context
        .referrer()
        .filter(|referrer| !referrer.is_empty())
        .and_then(|referrer| normalize_origin(&referrer).ok())
        .or_else(|| {
            context
                .ancestor_origins()
                .first()
                .and_then(|origin| normalize_origin(origin).ok())
        })
}

/// Allowed-origin set with a wildcard flag
#[derive(Debug, Clone, Default)]
pub struct OriginPolicy {
    any: bool,
    origins: AHashSet<String>,
}

impl OriginPolicy {
    pub fn new<I, S>(origins: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut policy = Self::default();
        for origin in origins {
            let origin = normalize_origin(origin.as_ref())?;
            if origin == ANY_ORIGIN {
                policy.any = true;
            } else {
                policy.origins.insert(origin);
            }
        }
        Ok(policy)
    }

    pub fn allows(&self, origin: &str) -> bool {
        self.any || self.origins.contains(origin)
    }

    pub fn allows_any(&self) -> bool {
        self.any
    }

    pub fn is_empty(&self) -> bool {
        !self.any && self.origins.is_empty()
    }

    pub fn len(&self) -> usize {
        self.origins.len() + usize::from(self.any)
    }
}

/// Inbound channel restriction
///
/// Unrestricted accepts everything, unscoped traffic included. Once
/// restricted, a message must carry one of the listed ids.
#[derive(Debug, Clone, Default)]
pub struct ChannelPolicy {
    allowed: Option<AHashSet<ChannelId>>,
}

impl ChannelPolicy {
    pub fn new<I: IntoIterator<Item = ChannelId>>(ids: I) -> Self {
        let allowed: AHashSet<ChannelId> = ids.into_iter().collect();
        Self {
            allowed: (!allowed.is_empty()).then_some(allowed),
        }
    }

    pub fn is_restricted(&self) -> bool {
        self.allowed.is_some()
    }

    pub fn allows(&self, channel_id: Option<&ChannelId>) -> bool {
        match (&self.allowed, channel_id) {
            (None, _) => true,
            (Some(allowed), Some(id)) => allowed.contains(id),
            (Some(_), None) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockWindow;
    use crate::window::{ListenerId, NativeListener, WindowLike};
    use serde_json::Value;
    use std::sync::Arc;

    struct Context {
        referrer: Option<String>,
        ancestors: Vec<String>,
        window: MockWindow,
    }

    impl WindowLike for Context {
        fn post_message(&self, data: Value, target_origin: &str) {
            self.window.post_message(data, target_origin)
        }

        fn add_message_listener(&self, listener: NativeListener) -> ListenerId {
            self.window.add_message_listener(listener)
        }

        fn remove_message_listener(&self, id: ListenerId) {
            self.window.remove_message_listener(id)
        }
    }

    impl BrowsingContext for Context {
        fn origin(&self) -> String {
            "https://child.example".to_string()
        }

        fn opener(&self) -> Option<Arc<dyn WindowLike>> {
            None
        }

        fn parent(&self) -> Option<Arc<dyn WindowLike>> {
            None
        }

        fn referrer(&self) -> Option<String> {
            self.referrer.clone()
        }

        fn ancestor_origins(&self) -> Vec<String> {
            self.ancestors.clone()
        }
    }

    #[test]
    fn test_normalize_origin() {
        assert_eq!(
            normalize_origin("https://Example.com:443/path?q=1").unwrap(),
            "https://example.com"
        );
        assert_eq!(
            normalize_origin("http://localhost:8080/").unwrap(),
            "http://localhost:8080"
        );
        assert_eq!(normalize_origin("*").unwrap(), "*");
        assert_eq!(
            normalize_origin("not an origin"),
            Err(WindowError::InvalidOrigin("not an origin".to_string()))
        );
        assert!(normalize_origin("data:text/plain,hi").is_err());
    }

    #[test]
    fn test_derive_peer_origin() {
        let context = Context {
            referrer: Some("https://parent.example/page.html".to_string()),
            ancestors: vec!["https://ancestor.example".to_string()],
            window: MockWindow::default(),
        };
        assert_eq!(
            derive_peer_origin(&context).as_deref(),
            Some("https://parent.example")
        );

        let context = Context {
            referrer: Some(String::new()),
            ancestors: vec!["https://ancestor.example".to_string()],
            window: MockWindow::default(),
        };
        assert_eq!(
            derive_peer_origin(&context).as_deref(),
            Some("https://ancestor.example")
        );

        let context = Context {
            referrer: None,
            ancestors: Vec::new(),
            window: MockWindow::default(),
        };
        assert_eq!(derive_peer_origin(&context), None);
    }

    #[test]
    fn test_origin_policy() {
        let policy = OriginPolicy::new(["https://a.example/", "https://b.example"]).unwrap();
        assert!(policy.allows("https://a.example"));
        assert!(policy.allows("https://b.example"));
        assert!(!policy.allows("https://c.example"));
        assert!(!policy.allows_any());
        assert_eq!(policy.len(), 2);

        let any = OriginPolicy::new(["*"]).unwrap();
        assert!(any.allows("https://anything.example"));
        assert!(any.allows("null"));

        assert!(OriginPolicy::new(Vec::<String>::new()).unwrap().is_empty());
        assert!(OriginPolicy::new(["::"]).is_err());
    }

    #[test]
    fn test_channel_policy() {
        let open = ChannelPolicy::new(Vec::new());
        assert!(!open.is_restricted());
        assert!(open.allows(None));
        assert!(open.allows(Some(&ChannelId::from("x"))));

        let restricted = ChannelPolicy::new([ChannelId::from("a"), ChannelId::from(1)]);
        assert!(restricted.is_restricted());
        assert!(restricted.allows(Some(&ChannelId::from("a"))));
        assert!(restricted.allows(Some(&ChannelId::from(1))));
        assert!(!restricted.allows(Some(&ChannelId::from("1"))));
        assert!(!restricted.allows(None));
    }
}
