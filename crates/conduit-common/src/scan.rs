//! Reference aggregation over arbitrary store documents
//!
//! The bridge must learn which Secrets, ServiceAccounts and CA bundles a
//! store needs without knowing the provider's schema. Every document type
//! lowers itself into a small tagged-union IR ([`Node`]) and [`aggregate`]
//! walks that IR, collecting the three reference shapes wherever they appear.
//!
//! # Walk rules
//!
//! - **Record**: every field is tested against the reference shapes, then
//!   recursed into if it is a record or container.
//! - **Sequence**: every element is tested, then recursed into.
//! - **Mapping**: values are recursed into only if they are themselves
//!   mappings or sequences; any other value is skipped.
//! - **Absent** (`None`, JSON `null`): stops the walk for that branch.
//!
//! Matching is by type: a value is a credential reference because its type's
//! `AsNode` impl says so, never because of a field name.
//!
//! # Implementing `AsNode`
//!
//! Record types use [`as_node_record!`](crate::as_node_record), which
//! destructures the value so that forgetting a field is a compile error:
//!
//! ```ignore
//! conduit_common::as_node_record!(MyProvider { endpoint, auth, extra });
//! ```
//!
//! Enums lower to the node of their active variant.

use std::collections::{BTreeMap, HashMap};

use crate::refs::{CaProvider, SecretKeySelector, ServiceAccountSelector};

/// Tagged-union view of a document value
#[derive(Debug)]
pub enum Node<'a> {
    /// Scalar (string, number, bool); never walked
    Leaf,
    /// Missing optional value
    Absent,
    /// List or array
    Sequence(Vec<Node<'a>>),
    /// Map values (keys carry no references)
    Mapping(Vec<Node<'a>>),
    /// Struct-like value with fields in declaration order
    Record(Vec<Field<'a>>),
    /// One of the known reference shapes
    Reference(Reference<'a>),
}

impl Node<'_> {
    fn is_container(&self) -> bool {
        matches!(self, Node::Sequence(_) | Node::Mapping(_))
    }

    fn is_traversable(&self) -> bool {
        self.is_container() || matches!(self, Node::Record(_))
    }
}

/// Named field of a record node
#[derive(Debug)]
pub struct Field<'a> {
    /// Field name, for diagnostics only
    pub name: &'static str,
    /// Field value
    pub node: Node<'a>,
}

/// A reference found in a document
#[derive(Clone, Copy, Debug)]
pub enum Reference<'a> {
    /// Key within a Secret
    Credential(&'a SecretKeySelector),
    /// ServiceAccount whose token is needed
    Identity(&'a ServiceAccountSelector),
    /// CA bundle in a Secret or ConfigMap
    TrustBundle(&'a CaProvider),
}

/// Lower a value into the scanning IR
pub trait AsNode {
    /// Build the node for this value
    fn as_node(&self) -> Node<'_>;
}

/// Implement [`AsNode`] for a struct by listing all of its fields
///
/// The struct is destructured without `..`, so a field missing from the list
/// fails to compile.
#[macro_export]
macro_rules! as_node_record {
    ($ty:ty { $($field:ident),* $(,)? }) => {
        impl $crate::scan::AsNode for $ty {
            fn as_node(&self) -> $crate::scan::Node<'_> {
                let Self { $($field),* } = self;
                $crate::scan::Node::Record(vec![
                    $($crate::scan::Field {
                        name: stringify!($field),
                        node: $crate::scan::AsNode::as_node($field),
                    }),*
                ])
            }
        }
    };
}

/// References collected from a document, in depth-first field order
///
/// Duplicates are preserved.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ReferenceSet {
    /// Secret key references
    pub credentials: Vec<SecretKeySelector>,
    /// ServiceAccount references
    pub identities: Vec<ServiceAccountSelector>,
    /// CA bundle references
    pub trust_bundles: Vec<CaProvider>,
}

impl ReferenceSet {
    /// True when no reference of any shape was found
    pub fn is_empty(&self) -> bool {
        self.credentials.is_empty() && self.identities.is_empty() && self.trust_bundles.is_empty()
    }

    /// Total number of references
    pub fn len(&self) -> usize {
        self.credentials.len() + self.identities.len() + self.trust_bundles.len()
    }

    fn capture(&mut self, node: &Node<'_>) {
        if let Node::Reference(reference) = node {
            match reference {
                Reference::Credential(r) => self.credentials.push((*r).clone()),
                Reference::Identity(r) => self.identities.push((*r).clone()),
                Reference::TrustBundle(r) => self.trust_bundles.push((*r).clone()),
            }
        }
    }

    fn walk(&mut self, node: &Node<'_>) {
        match node {
            Node::Record(fields) => {
                for field in fields {
                    self.capture(&field.node);
                    if field.node.is_traversable() {
                        self.walk(&field.node);
                    }
                }
            }
            Node::Sequence(items) => {
                for item in items {
                    self.capture(item);
                    if item.is_traversable() {
                        self.walk(item);
                    }
                }
            }
            Node::Mapping(values) => {
                for value in values {
                    if value.is_container() {
                        self.walk(value);
                    }
                }
            }
            Node::Reference(_) | Node::Leaf | Node::Absent => {}
        }
    }
}

/// Collect every reference embedded in `doc`
///
/// Never fails: documents without references yield an empty set.
pub fn aggregate<T: AsNode + ?Sized>(doc: &T) -> ReferenceSet {
    let root = doc.as_node();
    let mut refs = ReferenceSet::default();
    refs.capture(&root);
    refs.walk(&root);
    refs
}

// =============================================================================
// Reference shapes
// =============================================================================

impl AsNode for SecretKeySelector {
    fn as_node(&self) -> Node<'_> {
        Node::Reference(Reference::Credential(self))
    }
}

impl AsNode for ServiceAccountSelector {
    fn as_node(&self) -> Node<'_> {
        Node::Reference(Reference::Identity(self))
    }
}

impl AsNode for CaProvider {
    fn as_node(&self) -> Node<'_> {
        Node::Reference(Reference::TrustBundle(self))
    }
}

// =============================================================================
// Standard types
// =============================================================================

macro_rules! leaf {
    ($($ty:ty),*) => {
        $(impl AsNode for $ty {
            fn as_node(&self) -> Node<'_> {
                Node::Leaf
            }
        })*
    };
}

leaf!(String, str, bool, char, i8, i16, i32, i64, u8, u16, u32, u64, usize, f32, f64);

impl<T: AsNode + ?Sized> AsNode for &T {
    fn as_node(&self) -> Node<'_> {
        (**self).as_node()
    }
}

impl<T: AsNode + ?Sized> AsNode for Box<T> {
    fn as_node(&self) -> Node<'_> {
        (**self).as_node()
    }
}

impl<T: AsNode> AsNode for Option<T> {
    fn as_node(&self) -> Node<'_> {
        match self {
            Some(value) => value.as_node(),
            None => Node::Absent,
        }
    }
}

impl<T: AsNode> AsNode for Vec<T> {
    fn as_node(&self) -> Node<'_> {
        Node::Sequence(self.iter().map(AsNode::as_node).collect())
    }
}

impl<T: AsNode> AsNode for [T] {
    fn as_node(&self) -> Node<'_> {
        Node::Sequence(self.iter().map(AsNode::as_node).collect())
    }
}

impl<K, V: AsNode> AsNode for BTreeMap<K, V> {
    fn as_node(&self) -> Node<'_> {
        Node::Mapping(self.values().map(AsNode::as_node).collect())
    }
}

impl<K, V: AsNode, S> AsNode for HashMap<K, V, S> {
    fn as_node(&self) -> Node<'_> {
        Node::Mapping(self.values().map(AsNode::as_node).collect())
    }
}

impl AsNode for serde_json::Value {
    fn as_node(&self) -> Node<'_> {
        match self {
            serde_json::Value::Null => Node::Absent,
            serde_json::Value::Bool(_)
            | serde_json::Value::Number(_)
            | serde_json::Value::String(_) => Node::Leaf,
            serde_json::Value::Array(items) => {
                Node::Sequence(items.iter().map(AsNode::as_node).collect())
            }
            serde_json::Value::Object(map) => {
                Node::Mapping(map.values().map(AsNode::as_node).collect())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::refs::CaProviderType;
    use crate::store::{
        KubernetesAuth, KubernetesProvider, KubernetesServer, ProviderSpec, StoreSpec,
        TokenAuth, VaultAppRole, VaultAuth, VaultKubernetesAuth, VaultProvider, WebhookProvider,
        WebhookSecret,
    };

    struct Leafy {
        a: String,
        b: i64,
        c: Vec<String>,
    }
    crate::as_node_record!(Leafy { a, b, c });

    struct Nested {
        first: SecretKeySelector,
        maybe: Option<SecretKeySelector>,
        inner: Option<Box<Nested>>,
        list: Vec<SecretKeySelector>,
        by_name: BTreeMap<String, SecretKeySelector>,
        lists_by_name: BTreeMap<String, Vec<ServiceAccountSelector>>,
    }
    crate::as_node_record!(Nested {
        first,
        maybe,
        inner,
        list,
        by_name,
        lists_by_name
    });

    enum Auth {
        Token(SecretKeySelector),
        Identity(ServiceAccountSelector),
    }

    impl AsNode for Auth {
        fn as_node(&self) -> Node<'_> {
            match self {
                Auth::Token(r) => r.as_node(),
                Auth::Identity(r) => r.as_node(),
            }
        }
    }

    struct WithEnum {
        auth: Auth,
        fallbacks: Vec<Auth>,
    }
    crate::as_node_record!(WithEnum { auth, fallbacks });

    fn names(refs: &[SecretKeySelector]) -> Vec<&str> {
        refs.iter().map(|r| r.name.as_str()).collect()
    }

    #[test]
    fn test_scalar_only_document_is_empty() {
        let doc = Leafy {
            a: "x".repeat(10_000),
            b: 7,
            c: vec!["y".to_string(); 1_000],
        };
        let refs = aggregate(&doc);
        assert!(refs.is_empty());
        assert_eq!(refs.len(), 0);
    }

    #[test]
    fn test_depth_first_field_order() {
        let doc = Nested {
            first: SecretKeySelector::new("a", "k"),
            maybe: Some(SecretKeySelector::new("b", "k")),
            inner: Some(Box::new(Nested {
                first: SecretKeySelector::new("c", "k"),
                maybe: None,
                inner: None,
                list: vec![SecretKeySelector::new("d", "k")],
                by_name: BTreeMap::new(),
                lists_by_name: BTreeMap::new(),
            })),
            list: vec![
                SecretKeySelector::new("e", "k"),
                SecretKeySelector::new("e", "k"),
            ],
            by_name: BTreeMap::new(),
            lists_by_name: BTreeMap::new(),
        };

        let refs = aggregate(&doc);
        assert_eq!(names(&refs.credentials), vec!["a", "b", "c", "d", "e", "e"]);
        assert!(refs.identities.is_empty());
    }

    #[test]
    fn test_mapping_skips_non_container_values() {
        let mut by_name = BTreeMap::new();
        by_name.insert("skipped".to_string(), SecretKeySelector::new("m", "k"));
        let mut lists_by_name = BTreeMap::new();
        lists_by_name.insert(
            "walked".to_string(),
            vec![ServiceAccountSelector::new("sa-1"), ServiceAccountSelector::new("sa-2")],
        );

        let doc = Nested {
            first: SecretKeySelector::new("a", "k"),
            maybe: None,
            inner: None,
            list: vec![],
            by_name,
            lists_by_name,
        };

        let refs = aggregate(&doc);
        assert_eq!(names(&refs.credentials), vec!["a"]);
        assert_eq!(refs.identities.len(), 2);
        assert_eq!(refs.identities[1].name, "sa-2");
    }

    #[test]
    fn test_enum_resolves_to_active_variant() {
        let doc = WithEnum {
            auth: Auth::Identity(ServiceAccountSelector::new("eso")),
            fallbacks: vec![
                Auth::Token(SecretKeySelector::new("t1", "token")),
                Auth::Identity(ServiceAccountSelector::new("backup")),
            ],
        };
        let refs = aggregate(&doc);
        assert_eq!(refs.credentials.len(), 1);
        assert_eq!(refs.identities.len(), 2);
        assert_eq!(refs.identities[0].name, "eso");
    }

    #[test]
    fn test_root_reference_is_captured() {
        let refs = aggregate(&SecretKeySelector::new("root", "k"));
        assert_eq!(names(&refs.credentials), vec!["root"]);
    }

    #[test]
    fn test_json_value_has_no_typed_references() {
        let value = serde_json::json!({
            "name": "looks-like-a-ref",
            "key": "password",
            "nested": [{"name": "x"}, null, 3]
        });
        assert!(aggregate(&value).is_empty());
    }

    #[test]
    fn test_store_spec_collects_all_shapes() {
        let ca = CaProvider {
            type_: CaProviderType::ConfigMap,
            name: "root-ca".to_string(),
            namespace: None,
            key: "ca.crt".to_string(),
        };
        let spec = StoreSpec {
            provider: ProviderSpec {
                kubernetes: Some(KubernetesProvider {
                    server: KubernetesServer {
                        ca_provider: Some(ca.clone()),
                        ..Default::default()
                    },
                    auth: KubernetesAuth {
                        token: Some(TokenAuth {
                            bearer_token: SecretKeySelector::new("k8s-token", "token"),
                        }),
                        service_account: Some(ServiceAccountSelector::new("reader")),
                        cert: None,
                    },
                    remote_namespace: "apps".to_string(),
                }),
                vault: Some(VaultProvider {
                    server: "https://vault".to_string(),
                    auth: VaultAuth {
                        token_secret_ref: None,
                        kubernetes: Some(VaultKubernetesAuth {
                            role: "eso".to_string(),
                            service_account_ref: Some(ServiceAccountSelector::new("vault-sa")),
                            ..Default::default()
                        }),
                        app_role: Some(VaultAppRole {
                            secret_ref: SecretKeySelector::new("approle", "secret-id"),
                            ..Default::default()
                        }),
                    },
                    ..Default::default()
                }),
                webhook: Some(WebhookProvider {
                    url: "https://hook".to_string(),
                    secrets: vec![WebhookSecret {
                        name: "auth".to_string(),
                        secret_ref: SecretKeySelector::new("hook-auth", "token"),
                    }],
                    ca_provider: Some(ca),
                    ..Default::default()
                }),
                ..Default::default()
            },
            ..Default::default()
        };

        let refs = aggregate(&spec);
        assert_eq!(
            names(&refs.credentials),
            vec!["k8s-token", "approle", "hook-auth"]
        );
        let identities: Vec<&str> = refs.identities.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(identities, vec!["reader", "vault-sa"]);
        assert_eq!(refs.trust_bundles.len(), 2);
        assert_eq!(refs.len(), 7);
    }
}
