use std::fmt::{Display, Formatter};

use crate::store::error::{invalid_argument, StoreResult};

/// A slash-separated address shared by both backend address spaces.
///
/// The primary store reads it as `collection/documentId` (one optional
/// subcollection level below a document); the push store reads the same
/// segments as a path into its tree. Both spellings are produced by
/// [`PathResolver`], which is the only place the arity rules live.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ResourcePath {
    segments: Vec<String>,
}

impl ResourcePath {
    pub fn from_segments<I, S>(segments: I) -> StoreResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let segments: Vec<String> = segments.into_iter().map(Into::into).collect();
        for segment in &segments {
            if segment.is_empty() {
                return Err(invalid_argument("Resource path segment cannot be empty"));
            }
            if segment.contains('/') {
                return Err(invalid_argument(format!(
                    "Resource path segment \"{segment}\" cannot contain '/'"
                )));
            }
        }
        Ok(Self { segments })
    }

    pub fn from_string(path: &str) -> StoreResult<Self> {
        let trimmed = path.trim_matches('/');
        if trimmed.is_empty() {
            return Err(invalid_argument("Resource path cannot be empty"));
        }
        if trimmed.contains("//") {
            return Err(invalid_argument("Found empty segment in resource path"));
        }
        Self::from_segments(trimmed.split('/'))
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn last_segment(&self) -> Option<&str> {
        self.segments.last().map(|s| s.as_str())
    }

    pub fn child(&self, segment: &str) -> StoreResult<Self> {
        let mut segments = self.segments.clone();
        segments.push(segment.to_string());
        Self::from_segments(segments)
    }

    pub fn parent(&self) -> Option<Self> {
        if self.segments.len() <= 1 {
            return None;
        }
        let mut segments = self.segments.clone();
        segments.pop();
        Some(Self { segments })
    }

    /// Whether one path is an ancestor of the other (or they are equal).
    /// A write at either end of the relation changes the snapshot seen at the
    /// other, so subscription fan-out matches on this.
    pub fn is_related_to(&self, other: &Self) -> bool {
        let shorter = self.len().min(other.len());
        self.segments[..shorter] == other.segments[..shorter]
    }

    pub fn canonical_string(&self) -> String {
        self.segments.join("/")
    }
}

impl Display for ResourcePath {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.canonical_string())
    }
}

/// Builds the canonical addresses the facade operates on. Arity rules:
/// collections have an odd number of segments, documents an even number,
/// and exactly one subcollection level is supported.
pub struct PathResolver;

impl PathResolver {
    pub fn collection(collection: &str) -> StoreResult<ResourcePath> {
        if collection.is_empty() {
            return Err(invalid_argument("Collection name cannot be empty"));
        }
        ResourcePath::from_segments([collection])
    }

    pub fn document(collection: &str, id: &str) -> StoreResult<ResourcePath> {
        if id.is_empty() {
            return Err(invalid_argument("Document id cannot be empty"));
        }
        Self::collection(collection)?.child(id)
    }

    pub fn subcollection(
        collection: &str,
        id: &str,
        subcollection: &str,
    ) -> StoreResult<ResourcePath> {
        if subcollection.is_empty() {
            return Err(invalid_argument("Subcollection name cannot be empty"));
        }
        Self::document(collection, id)?.child(subcollection)
    }

    pub fn document_in_sub(
        collection: &str,
        id: &str,
        subcollection: &str,
        sub_id: &str,
    ) -> StoreResult<ResourcePath> {
        if sub_id.is_empty() {
            return Err(invalid_argument("Document id cannot be empty"));
        }
        Self::subcollection(collection, id, subcollection)?.child(sub_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_document_and_subcollection_addresses() {
        let doc = PathResolver::document("properties", "p1").unwrap();
        assert_eq!(doc.canonical_string(), "properties/p1");

        let sub = PathResolver::document_in_sub("properties", "p1", "viewings", "v9").unwrap();
        assert_eq!(sub.canonical_string(), "properties/p1/viewings/v9");
        assert_eq!(sub.parent().unwrap().canonical_string(), "properties/p1/viewings");
    }

    #[test]
    fn rejects_empty_and_slashed_segments() {
        assert!(PathResolver::collection("").is_err());
        assert!(PathResolver::document("properties", "").is_err());
        assert!(ResourcePath::from_segments(["a/b"]).is_err());
        assert!(ResourcePath::from_string("a//b").is_err());
    }

    #[test]
    fn relates_ancestors_and_descendants() {
        let all = ResourcePath::from_string("messages").unwrap();
        let one = ResourcePath::from_string("messages/m1").unwrap();
        let other = ResourcePath::from_string("conversations").unwrap();

        assert!(all.is_related_to(&one));
        assert!(one.is_related_to(&all));
        assert!(all.is_related_to(&all));
        assert!(!all.is_related_to(&other));
    }
}
