//! Entity table
//!
//! Static description of every Listrak entity: endpoint, paging, primary
//! key, the id it contributes to child scopes and how it is bookmarked.
//! Lists are the top-level parent; everything else hangs below a list and
//! is walked in `ENTITY_ORDER`.

use crate::config::{Catalog, CatalogEntry, FieldMetadata, MetadataEntry};
use crate::types::Inclusion;
use serde_json::{json, Value};
use std::collections::BTreeMap;

/// Top-level parent entity
pub const LISTS: &str = "lists";

/// Per-list processing order; ancestors always precede descendants
pub const ENTITY_ORDER: [&str; 10] = [
    "campaigns",
    "contacts",
    "messages",
    "message_activity",
    "message_links",
    "message_link_clickers",
    "conversations",
    "conversation_messages",
    "conversation_message_activity",
    "transactional_messages",
];

/// Id a record contributes to the scope of its children
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChildKey {
    /// Field read from the parent record
    pub field: &'static str,
    /// Name the value carries in child scopes and enriched records
    pub alias: &'static str,
}

/// Follow-up request fetching the full record for a listed id
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DetailFetch {
    /// Id field of the listing record
    pub id_field: &'static str,
    /// Detail endpoint; `{{ id_field }}` resolves to the listed id
    pub path: &'static str,
}

/// One bookmarked partition of an entity within a scope
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScopeVariant {
    /// Variant name, used in the bookmark key
    pub name: &'static str,
    /// Extra query parameter selecting the variant
    pub param: (&'static str, &'static str),
    /// Record field holding the watermark
    pub watermark_field: &'static str,
}

/// How an entity avoids refetching old data
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Incremental {
    /// Fetched in full every run
    Full,
    /// Per-scope watermark sent as `startDate` and advanced after the scope
    Watermark {
        /// Partitions, each with its own bookmark
        variants: &'static [ScopeVariant],
    },
    /// Fetched for recent parents only; one global bookmark set at run end
    Activity {
        /// Static query parameters
        params: &'static [(&'static str, &'static str)],
    },
}

/// Static definition of an entity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntityDef {
    /// Entity (stream) name
    pub name: &'static str,
    /// Parent entity, `None` for lists
    pub parent: Option<&'static str>,
    /// Listing endpoint with `{{ key }}` placeholders
    pub path: &'static str,
    /// Whether the listing is cursor paged
    pub paged: bool,
    /// Detail fetch for listings that return ids only
    pub detail: Option<DetailFetch>,
    /// Primary key fields (may be empty)
    pub key_properties: &'static [&'static str],
    /// Key this entity contributes to child scopes
    pub child_key: Option<ChildKey>,
    /// Bookmark policy
    pub incremental: Incremental,
}

/// Query parameter carrying a watermark or send date
pub const START_DATE_PARAM: &str = "startDate";

/// Field compared against the activity window
pub const SEND_DATE_FIELD: &str = "sendDate";

const CONTACT_VARIANTS: &[ScopeVariant] = &[
    ScopeVariant {
        name: "Subscribed",
        param: ("subscriptionState", "Subscribed"),
        watermark_field: "subscribeDate",
    },
    ScopeVariant {
        name: "Unsubscribed",
        param: ("subscriptionState", "Unsubscribed"),
        watermark_field: "unsubscribeDate",
    },
];

static ENTITIES: [EntityDef; 11] = [
    EntityDef {
        name: LISTS,
        parent: None,
        path: "/List",
        paged: false,
        detail: None,
        key_properties: &["listId"],
        child_key: Some(ChildKey {
            field: "listId",
            alias: "listId",
        }),
        incremental: Incremental::Full,
    },
    EntityDef {
        name: "campaigns",
        parent: Some(LISTS),
        path: "/List/{{ listId }}/Campaign",
        paged: false,
        detail: None,
        key_properties: &["campaignId"],
        child_key: None,
        incremental: Incremental::Full,
    },
    EntityDef {
        name: "contacts",
        parent: Some(LISTS),
        path: "/List/{{ listId }}/Contact",
        paged: true,
        detail: None,
        key_properties: &["listId", "emailAddress"],
        child_key: None,
        incremental: Incremental::Watermark {
            variants: CONTACT_VARIANTS,
        },
    },
    EntityDef {
        name: "messages",
        parent: Some(LISTS),
        path: "/List/{{ listId }}/Message",
        paged: true,
        detail: Some(DetailFetch {
            id_field: "messageId",
            path: "/List/{{ listId }}/Message/{{ messageId }}",
        }),
        key_properties: &["messageId"],
        child_key: Some(ChildKey {
            field: "messageId",
            alias: "messageId",
        }),
        incremental: Incremental::Full,
    },
    EntityDef {
        name: "message_activity",
        parent: Some("messages"),
        path: "/List/{{ listId }}/Message/{{ messageId }}/Activity",
        paged: true,
        detail: None,
        key_properties: &[],
        child_key: None,
        incremental: Incremental::Activity {
            params: &[("dateType", "Activity")],
        },
    },
    EntityDef {
        name: "message_links",
        parent: Some("messages"),
        path: "/List/{{ listId }}/Message/{{ messageId }}/Link",
        paged: true,
        detail: None,
        key_properties: &["linkId"],
        child_key: Some(ChildKey {
            field: "linkId",
            alias: "linkId",
        }),
        incremental: Incremental::Full,
    },
    EntityDef {
        name: "message_link_clickers",
        parent: Some("message_links"),
        path: "/List/{{ listId }}/Message/{{ messageId }}/Link/{{ linkId }}/Clicker",
        paged: true,
        detail: None,
        key_properties: &["linkId", "emailAddress", "clickDate"],
        child_key: None,
        incremental: Incremental::Full,
    },
    EntityDef {
        name: "conversations",
        parent: Some(LISTS),
        path: "/List/{{ listId }}/Conversation",
        paged: false,
        detail: None,
        key_properties: &["conversationId"],
        child_key: Some(ChildKey {
            field: "conversationId",
            alias: "conversationId",
        }),
        incremental: Incremental::Full,
    },
    EntityDef {
        name: "conversation_messages",
        parent: Some("conversations"),
        path: "/List/{{ listId }}/Conversation/{{ conversationId }}/Message",
        paged: true,
        detail: Some(DetailFetch {
            id_field: "messageId",
            path: "/List/{{ listId }}/Conversation/{{ conversationId }}/Message/{{ messageId }}",
        }),
        key_properties: &["messageId"],
        child_key: Some(ChildKey {
            field: "messageId",
            alias: "conversationMessageId",
        }),
        incremental: Incremental::Full,
    },
    EntityDef {
        name: "conversation_message_activity",
        parent: Some("conversation_messages"),
        path: "/List/{{ listId }}/Conversation/{{ conversationId }}/Message/{{ conversationMessageId }}/Activity",
        paged: true,
        detail: None,
        key_properties: &[],
        child_key: None,
        incremental: Incremental::Activity { params: &[] },
    },
    EntityDef {
        name: "transactional_messages",
        parent: Some(LISTS),
        path: "/List/{{ listId }}/TransactionalMessage",
        paged: false,
        detail: None,
        key_properties: &["transactionalMessageId"],
        child_key: None,
        incremental: Incremental::Full,
    },
];

/// All entity definitions, lists first
pub fn all() -> &'static [EntityDef] {
    &ENTITIES
}

/// Look up an entity by name
pub fn get(name: &str) -> Option<&'static EntityDef> {
    ENTITIES.iter().find(|e| e.name == name)
}

/// Position of an entity in the per-list order
pub fn order_index(name: &str) -> Option<usize> {
    ENTITY_ORDER.iter().position(|e| *e == name)
}

/// Direct prerequisites of each entity
pub type DependencyTable = BTreeMap<String, Vec<String>>;

/// Dependency table derived from the parent links
pub fn dependency_table() -> DependencyTable {
    ENTITIES
        .iter()
        .map(|e| {
            (
                e.name.to_string(),
                e.parent.map(str::to_string).into_iter().collect(),
            )
        })
        .collect()
}

// ============================================================================
// Discovery
// ============================================================================

fn property_schema(field: &str) -> Value {
    if field.ends_with("Date") {
        json!({"type": ["null", "string"], "format": "date-time"})
    } else if field == "emailAddress" {
        json!({"type": ["null", "string"]})
    } else {
        json!({"type": ["null", "integer"]})
    }
}

/// Fields described in the discovered schema of an entity
fn known_fields(entity: &EntityDef) -> Vec<&'static str> {
    let mut fields: Vec<&'static str> = entity.key_properties.to_vec();
    let mut push = |field: &'static str| {
        if !fields.contains(&field) {
            fields.push(field);
        }
    };

    if let Some(child) = entity.child_key {
        push(child.field);
    }
    if let Incremental::Watermark { variants } = entity.incremental {
        for variant in variants {
            push(variant.watermark_field);
        }
    }
    if entity.name == "messages" || entity.name == "conversation_messages" {
        push(SEND_DATE_FIELD);
    }
    fields
}

/// JSON schema of an entity
///
/// Describes the key, id and watermark fields; anything else the API
/// returns passes through as additional properties.
pub fn schema(entity: &EntityDef) -> Value {
    let properties: serde_json::Map<String, Value> = known_fields(entity)
        .iter()
        .map(|f| ((*f).to_string(), property_schema(f)))
        .collect();

    json!({
        "type": ["null", "object"],
        "additionalProperties": true,
        "properties": properties,
    })
}

/// Build the catalog describing every entity
///
/// Primary-key fields are `automatic`, everything else `available`.
/// Nothing is selected.
pub fn discover() -> Catalog {
    let streams = ENTITIES
        .iter()
        .map(|entity| {
            let fields = known_fields(entity);
            let key_properties: Vec<String> =
                entity.key_properties.iter().map(|k| (*k).to_string()).collect();

            let mut metadata = vec![MetadataEntry {
                breadcrumb: Vec::new(),
                metadata: FieldMetadata {
                    table_key_properties: Some(key_properties.clone()),
                    ..FieldMetadata::default()
                },
            }];
            metadata.extend(fields.iter().map(|field| MetadataEntry {
                breadcrumb: vec!["properties".to_string(), (*field).to_string()],
                metadata: FieldMetadata {
                    inclusion: Some(if entity.key_properties.contains(field) {
                        Inclusion::Automatic
                    } else {
                        Inclusion::Available
                    }),
                    ..FieldMetadata::default()
                },
            }));

            CatalogEntry {
                tap_stream_id: entity.name.to_string(),
                stream: entity.name.to_string(),
                key_properties,
                schema: schema(entity),
                metadata,
            }
        })
        .collect();

    Catalog { streams }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template;

    #[test]
    fn test_every_ordered_entity_is_defined() {
        for name in ENTITY_ORDER {
            assert!(get(name).is_some(), "{name} missing");
        }
        assert_eq!(all().len(), ENTITY_ORDER.len() + 1);
        assert!(get(LISTS).unwrap().parent.is_none());
    }

    #[test]
    fn test_parents_precede_children() {
        for name in ENTITY_ORDER {
            let parent = get(name).unwrap().parent.unwrap();
            if parent != LISTS {
                assert!(
                    order_index(parent).unwrap() < order_index(name).unwrap(),
                    "{parent} must come before {name}"
                );
            }
        }
    }

    #[test]
    fn test_children_have_keyed_parents() {
        for entity in all() {
            if let Some(parent) = entity.parent {
                assert!(
                    get(parent).unwrap().child_key.is_some(),
                    "{} has a parent without a child key",
                    entity.name
                );
            }
        }
    }

    #[test]
    fn test_paths_only_use_scope_keys() {
        // Every placeholder is provided by some ancestor's child key
        for entity in all() {
            let mut available = Vec::new();
            let mut current = entity.parent;
            while let Some(name) = current {
                let def = get(name).unwrap();
                available.push(def.child_key.unwrap().alias);
                current = def.parent;
            }
            for var in template::extract_variables(entity.path) {
                assert!(available.contains(&var), "{}: {var}", entity.name);
            }
        }
    }

    #[test]
    fn test_dependency_table() {
        let table = dependency_table();
        assert_eq!(table["lists"], Vec::<String>::new());
        assert_eq!(table["message_link_clickers"], vec!["message_links"]);
        assert_eq!(table["conversation_message_activity"], vec!["conversation_messages"]);
        assert_eq!(table.len(), 11);
    }

    #[test]
    fn test_discover_catalog() {
        let catalog = discover();
        assert_eq!(catalog.streams.len(), 11);
        assert!(catalog.selected_stream_ids().is_empty());

        let contacts = catalog.get_stream("contacts").unwrap();
        assert_eq!(contacts.key_properties, vec!["listId", "emailAddress"]);
        assert_eq!(
            contacts.root_metadata().unwrap().table_key_properties,
            Some(vec!["listId".to_string(), "emailAddress".to_string()])
        );

        let inclusion = |stream: &CatalogEntry, field: &str| {
            stream
                .metadata
                .iter()
                .find(|m| m.breadcrumb == ["properties", field])
                .and_then(|m| m.metadata.inclusion)
        };
        assert_eq!(inclusion(contacts, "emailAddress"), Some(Inclusion::Automatic));
        assert_eq!(inclusion(contacts, "subscribeDate"), Some(Inclusion::Available));

        let activity = catalog.get_stream("message_activity").unwrap();
        assert!(activity.key_properties.is_empty());
    }
}
