use super::ConfigurationError;
use crate::library::communication::event::{
    EntryId, StreamFactory, StreamHandle, StreamType, WireMessage,
};
use crate::library::helpers::{snake_case_slug, split_into_two};
use crate::library::BoxedError;
use log::{debug, warn};
use std::collections::{BTreeMap, VecDeque};
use std::str::FromStr;
use std::sync::{Mutex, MutexGuard};

/// Sub-group receiving all command streams declared without a label
pub const DEFAULT_SUBGROUP: &str = "default";

/// Derives the consumer group id of a sub-group, `cg-{service}` for the default
/// and `cg-{service}-{subgroup}` for every other sub-group
pub fn consumer_group_id(service: &str, subgroup: &str) -> String {
    if subgroup == DEFAULT_SUBGROUP {
        format!("cg-{}", service)
    } else {
        format!("cg-{}-{}", service, subgroup)
    }
}

/// Command stream routed to a consumer sub-group
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandStreamDeclaration {
    stream: String,
    subgroup: String,
}

impl CommandStreamDeclaration {
    /// Routes the stream into the default sub-group
    pub fn new(stream: impl Into<String>) -> Self {
        Self {
            stream: stream.into(),
            subgroup: DEFAULT_SUBGROUP.to_owned(),
        }
    }

    /// Routes the stream into the sub-group with the given label.
    /// Labels are normalized, labels without any alphanumeric characters select the default sub-group.
    pub fn in_subgroup(stream: impl Into<String>, label: &str) -> Self {
        let subgroup = match snake_case_slug(label) {
            slug if slug.is_empty() => DEFAULT_SUBGROUP.to_owned(),
            slug => slug,
        };

        Self {
            stream: stream.into(),
            subgroup,
        }
    }

    /// Name of the command stream
    pub fn stream(&self) -> &str {
        &self.stream
    }

    /// Normalized sub-group label
    pub fn subgroup(&self) -> &str {
        &self.subgroup
    }
}

impl From<&str> for CommandStreamDeclaration {
    fn from(stream: &str) -> Self {
        Self::new(stream)
    }
}

impl From<(&str, &str)> for CommandStreamDeclaration {
    fn from((stream, label): (&str, &str)) -> Self {
        Self::in_subgroup(stream, label)
    }
}

/// Parses `stream` or `stream:label`
impl FromStr for CommandStreamDeclaration {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match split_into_two(s, ":") {
            Some((stream, label)) => Self::in_subgroup(stream, &label),
            None => Self::new(s),
        })
    }
}

/// Entry read through a [`ConsumerGroupRouter`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutedEntry {
    /// Stream the entry originates from
    pub stream: String,
    /// Identifier assigned by the stream provider
    pub event_id: EntryId,
    /// Undecoded message
    pub message: WireMessage,
}

struct Subscription {
    streams: Vec<String>,
    group_id: String,
    handle: Option<Box<dyn StreamHandle>>,
    /// Entries delivered by the provider but not yet handed out
    backlog: Mutex<VecDeque<RoutedEntry>>,
}

impl Subscription {
    fn backlog(&self) -> MutexGuard<'_, VecDeque<RoutedEntry>> {
        self.backlog
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Partitions command streams into consumer sub-groups
///
/// Each sub-group is an independent consumer group on the stream provider, read through a single
/// multiplexed handle. Every stream belongs to exactly one sub-group and the
/// [default](DEFAULT_SUBGROUP) sub-group always exists, even if no stream has been routed to it.
pub struct ConsumerGroupRouter {
    subscriptions: BTreeMap<String, Subscription>,
}

impl ConsumerGroupRouter {
    /// Groups the declarations by sub-group and requests one read handle per non-empty sub-group
    pub async fn build(
        service: &str,
        declarations: &[CommandStreamDeclaration],
        factory: &dyn StreamFactory,
    ) -> Result<Self, BoxedError> {
        let mut partition: BTreeMap<String, Vec<String>> = BTreeMap::new();
        partition.insert(DEFAULT_SUBGROUP.to_owned(), Vec::new());

        for declaration in declarations {
            let owner = partition
                .iter()
                .find(|(_, streams)| streams.contains(&declaration.stream))
                .map(|(subgroup, _)| subgroup.clone());

            if let Some(owner) = owner {
                warn!(
                    "Command stream {} is already routed to sub-group {}, ignoring declaration for {}",
                    declaration.stream, owner, declaration.subgroup
                );
                continue;
            }

            partition
                .entry(declaration.subgroup.clone())
                .or_default()
                .push(declaration.stream.clone());
        }

        let mut subscriptions = BTreeMap::new();

        for (subgroup, streams) in partition {
            let group_id = consumer_group_id(service, &subgroup);

            let handle = if streams.is_empty() {
                None
            } else {
                let handle = factory
                    .create(&streams, StreamType::ManyKeyConsumerOnly, Some(group_id.as_str()))
                    .await?;
                Some(handle)
            };

            debug!("Routing {:?} to {} ({})", streams, subgroup, group_id);

            subscriptions.insert(
                subgroup,
                Subscription {
                    streams,
                    group_id,
                    handle,
                    backlog: Mutex::new(VecDeque::new()),
                },
            );
        }

        Ok(Self { subscriptions })
    }

    /// Reads at most one pending entry across all streams of a sub-group without blocking.
    /// Which stream is served first is up to the stream provider.
    ///
    /// Providers may deliver one entry per stream on a single read. Those entries are already
    /// consumed from the group, so the surplus is kept and handed out before the provider is asked again.
    pub async fn read_one(&self, subgroup: &str) -> Result<Option<RoutedEntry>, BoxedError> {
        let subscription = self.subscription(subgroup)?;

        let handle = match &subscription.handle {
            Some(handle) => handle,
            None => return Ok(None),
        };

        let buffered = subscription.backlog().pop_front();
        if buffered.is_some() {
            return Ok(buffered);
        }

        let batch = handle.read_stream_events_list(1).await?;

        let mut backlog = subscription.backlog();
        backlog.extend(batch.into_iter().flat_map(|(stream, entries)| {
            entries
                .into_iter()
                .map(move |(event_id, message)| RoutedEntry {
                    stream: stream.clone(),
                    event_id,
                    message,
                })
        }));

        Ok(backlog.pop_front())
    }

    /// Labels of all sub-groups in lexicographic order
    pub fn subgroups(&self) -> Vec<&str> {
        self.subscriptions.keys().map(String::as_str).collect()
    }

    /// Streams routed to a sub-group, in declaration order
    pub fn streams(&self, subgroup: &str) -> Option<&[String]> {
        self.subscriptions
            .get(subgroup)
            .map(|subscription| subscription.streams.as_slice())
    }

    /// Consumer group id the sub-group reads with
    pub fn consumer_group_id(&self, subgroup: &str) -> Option<&str> {
        self.subscriptions
            .get(subgroup)
            .map(|subscription| subscription.group_id.as_str())
    }

    fn subscription(&self, subgroup: &str) -> Result<&Subscription, ConfigurationError> {
        self.subscriptions
            .get(subgroup)
            .ok_or_else(|| ConfigurationError::UnknownSubgroup(subgroup.to_owned()))
    }
}

#[cfg(test)]
mod does {
    use super::*;
    use crate::library::communication::event::EVENT_WIRE_FIELD;
    use crate::library::communication::implementation::memory::MemoryStreamFactory;

    fn message(payload: &str) -> WireMessage {
        let mut message = WireMessage::new();
        message.insert(EVENT_WIRE_FIELD.into(), payload.into());
        message
    }

    fn declarations() -> Vec<CommandStreamDeclaration> {
        vec![
            "CreateItem".into(),
            ("DeleteItem", "admin").into(),
            ("PurgeItems", "Admin").into(),
            ("Reindex", "Background Jobs").into(),
        ]
    }

    #[test]
    fn normalize_subgroup_labels() {
        assert_eq!(
            CommandStreamDeclaration::in_subgroup("a", "Background Jobs").subgroup(),
            "background_jobs"
        );
        assert_eq!(
            CommandStreamDeclaration::in_subgroup("a", "--").subgroup(),
            DEFAULT_SUBGROUP
        );
        assert_eq!(
            "DeleteItem:admin".parse::<CommandStreamDeclaration>().unwrap(),
            CommandStreamDeclaration::in_subgroup("DeleteItem", "admin")
        );
        assert_eq!(
            "CreateItem".parse::<CommandStreamDeclaration>().unwrap(),
            CommandStreamDeclaration::new("CreateItem")
        );
    }

    #[tokio::test]
    async fn partition_streams_into_subgroups() {
        let factory = MemoryStreamFactory::new();
        let router = ConsumerGroupRouter::build("catalog", &declarations(), &factory)
            .await
            .unwrap();

        assert_eq!(router.subgroups(), vec!["admin", "background_jobs", "default"]);
        assert_eq!(
            router.streams("admin").unwrap(),
            &["DeleteItem".to_string(), "PurgeItems".to_string()]
        );
        assert_eq!(router.streams("default").unwrap(), &["CreateItem".to_string()]);
        assert_eq!(router.consumer_group_id("default"), Some("cg-catalog"));
        assert_eq!(
            router.consumer_group_id("background_jobs"),
            Some("cg-catalog-background_jobs")
        );
        assert_eq!(factory.groups("DeleteItem"), vec!["cg-catalog-admin"]);
    }

    #[tokio::test]
    async fn route_every_stream_exactly_once() {
        let factory = MemoryStreamFactory::new();
        let declarations: Vec<CommandStreamDeclaration> = vec![
            "CreateItem".into(),
            ("CreateItem", "admin").into(),
            ("DeleteItem", "admin").into(),
        ];

        let router = ConsumerGroupRouter::build("catalog", &declarations, &factory)
            .await
            .unwrap();

        let mut routed: Vec<&String> = router
            .subgroups()
            .into_iter()
            .flat_map(|subgroup| router.streams(subgroup).unwrap())
            .collect();
        routed.sort();

        assert_eq!(routed, vec!["CreateItem", "DeleteItem"]);
        assert_eq!(router.streams("admin").unwrap(), &["DeleteItem".to_string()]);
    }

    #[tokio::test]
    async fn keep_an_empty_default_subgroup() {
        let factory = MemoryStreamFactory::new();
        let declarations = vec![CommandStreamDeclaration::in_subgroup("DeleteItem", "admin")];

        let router = ConsumerGroupRouter::build("catalog", &declarations, &factory)
            .await
            .unwrap();

        assert_eq!(router.streams(DEFAULT_SUBGROUP).unwrap().len(), 0);
        assert_eq!(router.read_one(DEFAULT_SUBGROUP).await.unwrap(), None);
    }

    #[tokio::test]
    async fn read_one_entry_at_a_time() {
        let factory = MemoryStreamFactory::new();
        let router = ConsumerGroupRouter::build("catalog", &declarations(), &factory)
            .await
            .unwrap();

        let first = factory.push("DeleteItem", message("1"));
        factory.push("PurgeItems", message("2"));

        let entry = router.read_one("admin").await.unwrap().unwrap();
        assert_eq!(
            entry,
            RoutedEntry {
                stream: "DeleteItem".into(),
                event_id: first,
                message: message("1"),
            }
        );

        assert!(router.read_one("admin").await.unwrap().is_some());
        assert_eq!(router.read_one("admin").await.unwrap(), None);
        assert_eq!(router.read_one("default").await.unwrap(), None);
    }

    #[tokio::test]
    async fn hand_out_every_entry_of_busy_streams() {
        let factory = MemoryStreamFactory::new();
        let router = ConsumerGroupRouter::build("catalog", &declarations(), &factory)
            .await
            .unwrap();

        let mut expected = vec![
            factory.push("DeleteItem", message("1")),
            factory.push("PurgeItems", message("2")),
            factory.push("DeleteItem", message("3")),
            factory.push("PurgeItems", message("4")),
        ];

        let mut seen = Vec::new();
        while let Some(entry) = router.read_one("admin").await.unwrap() {
            seen.push(entry.event_id);
        }

        seen.sort();
        expected.sort();
        assert_eq!(seen, expected);
        assert!(factory.pending("DeleteItem", "cg-catalog-admin").is_empty());
    }

    #[tokio::test]
    async fn reject_unknown_subgroups() {
        let factory = MemoryStreamFactory::new();
        let router = ConsumerGroupRouter::build("catalog", &declarations(), &factory)
            .await
            .unwrap();

        assert!(router.read_one("billing").await.is_err());
        assert_eq!(router.streams("billing"), None);
    }
}
