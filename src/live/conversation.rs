use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, LazyLock, Mutex};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::live::subscription::SubscriptionHandle;
use crate::logger::Logger;
use crate::store::document::{now_millis, Document};
use crate::store::error::{internal_error, invalid_argument, StoreResult};
use crate::store::facade::{DocumentStore, StoreMode};

static LOGGER: LazyLock<Logger> = LazyLock::new(|| Logger::new("@rentral/conversations"));

const MESSAGES_COLLECTION: &str = "messages";
const CONVERSATIONS_COLLECTION: &str = "conversations";

/// One chat message. Append-only: written once, never mutated. The
/// attachment, when present, is a URL minted by the upload collaborator;
/// no binary payloads pass through here.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    #[serde(default, skip_serializing)]
    pub id: String,
    pub conversation_id: String,
    pub sender_id: String,
    pub content: String,
    pub sent_at: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attachment_url: Option<String>,
}

impl Message {
    fn from_document(document: &Document) -> Option<Self> {
        match serde_json::from_value::<Message>(Value::Object(document.fields().clone())) {
            Ok(mut message) => {
                message.id = document.id().to_string();
                Some(message)
            }
            Err(err) => {
                LOGGER.debug(format!(
                    "Skipping malformed message {}: {err}",
                    document.id()
                ));
                None
            }
        }
    }
}

/// The persisted conversation record. `lastMessage`/`lastMessageAt` are
/// derived state, refreshed after each send; the source of truth for the
/// list view is always the message snapshot itself.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    #[serde(default, skip_serializing)]
    pub id: String,
    pub participant_ids: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub property_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_message_at: Option<i64>,
}

/// Derived per-conversation state for the conversation-list view.
#[derive(Clone, Debug, PartialEq)]
pub struct ConversationView {
    pub conversation_id: String,
    pub last_message: Option<String>,
    pub last_message_at: Option<i64>,
    pub message_count: usize,
    pub unread_counts: HashMap<String, u64>,
}

/// Consumes the raw message snapshot stream and republishes ordered
/// per-conversation views. Everything derived here is a pure function of
/// the latest snapshot plus the read-marker table, so a recomputation can
/// run on every delivery without accumulating drift.
#[derive(Clone)]
pub struct ConversationSync {
    store: DocumentStore,
    read_markers: Arc<Mutex<HashMap<(String, String), i64>>>,
}

impl ConversationSync {
    pub fn new(store: DocumentStore) -> Self {
        Self {
            store,
            read_markers: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Records that `participant_id` has read `conversation_id` up to `at`
    /// (epoch millis). Feeds the unread counts of subsequent deliveries.
    pub fn mark_read(&self, conversation_id: &str, participant_id: &str, at: i64) {
        self.read_markers.lock().unwrap().insert(
            (conversation_id.to_string(), participant_id.to_string()),
            at,
        );
    }

    /// Upserts the conversation record for a pair of participants. Safe to
    /// call every time a thread view opens; existing derived fields are
    /// left alone.
    pub async fn open_conversation(
        &self,
        conversation_id: &str,
        participant_ids: [&str; 2],
        property_id: Option<&str>,
    ) -> StoreResult<()> {
        if participant_ids[0].is_empty() || participant_ids[1].is_empty() {
            return Err(invalid_argument("Participant ids cannot be empty"));
        }
        let record = Conversation {
            id: String::new(),
            participant_ids: participant_ids.map(str::to_string).to_vec(),
            property_id: property_id.map(str::to_string),
            last_message: None,
            last_message_at: None,
        };
        self.store
            .update(
                CONVERSATIONS_COLLECTION,
                conversation_id,
                to_fields(&record)?,
                StoreMode::Push,
            )
            .await
    }

    /// Appends a message and refreshes the conversation's derived metadata.
    ///
    /// Two separate writes, deliberately not atomic: a crash between them
    /// leaves metadata one message behind, and the next snapshot-driven
    /// recomputation (or the next send) catches it up.
    pub async fn send_message(
        &self,
        conversation_id: &str,
        sender_id: &str,
        content: &str,
        attachment_url: Option<String>,
    ) -> StoreResult<Message> {
        if conversation_id.is_empty() || sender_id.is_empty() {
            return Err(invalid_argument("Conversation and sender ids cannot be empty"));
        }
        let mut message = Message {
            id: String::new(),
            conversation_id: conversation_id.to_string(),
            sender_id: sender_id.to_string(),
            content: content.to_string(),
            sent_at: now_millis(),
            attachment_url,
        };

        let fields = to_fields(&message)?;
        let stored = self
            .store
            .add(MESSAGES_COLLECTION, fields, StoreMode::Push)
            .await?;
        message.id = stored.id().to_string();

        let mut patch = Map::new();
        patch.insert("lastMessage".to_string(), Value::from(message.content.clone()));
        patch.insert("lastMessageAt".to_string(), Value::from(message.sent_at));
        self.store
            .update(CONVERSATIONS_COLLECTION, conversation_id, patch, StoreMode::Push)
            .await?;

        Ok(message)
    }

    /// Watches one conversation's messages. Every delivery republishes the
    /// full sequence, sorted ascending by `sentAt`, replacing whatever the
    /// view held before; out-of-order re-deliveries are therefore harmless.
    pub fn watch_conversation<F>(
        &self,
        conversation_id: &str,
        on_messages: F,
    ) -> StoreResult<SubscriptionHandle>
    where
        F: Fn(Vec<Message>) + Send + Sync + 'static,
    {
        let conversation = conversation_id.to_string();
        let resource = format!("{CONVERSATIONS_COLLECTION}/{conversation_id}/{MESSAGES_COLLECTION}");
        self.store
            .subscribe_resource(&resource, MESSAGES_COLLECTION, move |documents| {
                on_messages(conversation_messages(documents, &conversation));
            })
    }

    /// Watches the conversation-list aggregation across every conversation.
    pub fn watch_conversation_list<F>(&self, on_views: F) -> StoreResult<SubscriptionHandle>
    where
        F: Fn(Vec<ConversationView>) + Send + Sync + 'static,
    {
        let markers = Arc::clone(&self.read_markers);
        let resource = format!("{CONVERSATIONS_COLLECTION}/list");
        self.store
            .subscribe_resource(&resource, MESSAGES_COLLECTION, move |documents| {
                let messages = decode_messages(documents);
                let markers = markers.lock().unwrap().clone();
                on_views(aggregate_conversations(&messages, &markers));
            })
    }

    pub fn unsubscribe(&self, handle: &SubscriptionHandle) {
        self.store.unsubscribe(handle);
    }
}

fn to_fields<T: Serialize>(value: &T) -> StoreResult<Map<String, Value>> {
    match serde_json::to_value(value) {
        Ok(Value::Object(fields)) => Ok(fields),
        Ok(_) => Err(internal_error("Record did not serialize to an object")),
        Err(err) => Err(internal_error(format!("Failed to serialize record: {err}"))),
    }
}

fn decode_messages(documents: &[Document]) -> Vec<Message> {
    documents.iter().filter_map(Message::from_document).collect()
}

/// Filters a snapshot down to one conversation and establishes the only
/// ordering the system guarantees: ascending `sentAt`, message id as the
/// tie-break.
fn conversation_messages(documents: &[Document], conversation_id: &str) -> Vec<Message> {
    let mut messages: Vec<Message> = decode_messages(documents)
        .into_iter()
        .filter(|message| message.conversation_id == conversation_id)
        .collect();
    sort_messages(&mut messages);
    messages
}

fn sort_messages(messages: &mut [Message]) {
    messages.sort_by(|left, right| {
        left.sent_at
            .cmp(&right.sent_at)
            .then_with(|| left.id.cmp(&right.id))
    });
}

/// Recomputes the list view from scratch: O(total messages) per delivery.
/// Unread counts cover every participant known to the snapshot or the
/// read-marker table; a message is unread for a participant when it arrived
/// after their marker and they did not send it themselves.
fn aggregate_conversations(
    messages: &[Message],
    read_markers: &HashMap<(String, String), i64>,
) -> Vec<ConversationView> {
    let mut grouped: BTreeMap<&str, Vec<&Message>> = BTreeMap::new();
    for message in messages {
        grouped
            .entry(message.conversation_id.as_str())
            .or_default()
            .push(message);
    }

    let mut views: Vec<ConversationView> = grouped
        .into_iter()
        .map(|(conversation_id, mut messages)| {
            messages.sort_by(|left, right| {
                left.sent_at
                    .cmp(&right.sent_at)
                    .then_with(|| left.id.cmp(&right.id))
            });

            let last = messages.last().expect("group is never empty");

            let mut participants: BTreeSet<&str> = messages
                .iter()
                .map(|message| message.sender_id.as_str())
                .collect();
            for (conversation, participant) in read_markers.keys() {
                if conversation.as_str() == conversation_id {
                    participants.insert(participant.as_str());
                }
            }

            let unread_counts = participants
                .into_iter()
                .map(|participant| {
                    let marker = read_markers
                        .get(&(conversation_id.to_string(), participant.to_string()))
                        .copied()
                        .unwrap_or(0);
                    let unread = messages
                        .iter()
                        .filter(|message| {
                            message.sent_at > marker && message.sender_id != participant
                        })
                        .count() as u64;
                    (participant.to_string(), unread)
                })
                .collect();

            ConversationView {
                conversation_id: conversation_id.to_string(),
                last_message: Some(last.content.clone()),
                last_message_at: Some(last.sent_at),
                message_count: messages.len(),
                unread_counts,
            }
        })
        .collect();

    // Most recent activity first, the order the list view renders in.
    views.sort_by(|left, right| {
        right
            .last_message_at
            .cmp(&left.last_message_at)
            .then_with(|| left.conversation_id.cmp(&right.conversation_id))
    });
    views
}
