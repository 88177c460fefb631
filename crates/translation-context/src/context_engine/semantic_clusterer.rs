//! Single-pass segmentation of a message sequence into contiguous topic runs.

use serde::{Deserialize, Serialize};

use crate::memory::Message;
use crate::memory_db::schema::MessageCluster;
use crate::utils::TextUtils;

pub const TOPIC_SEGMENT: &str = "topic_segment";

const ANIME_MARKERS: &[&str] = &["anime", "episode", "character"];
const TECH_MARKERS: &[&str] = &["code", "api", "function"];

/// Default similarity needed for [`SemanticClusterer::find_related`].
pub const RELATED_THRESHOLD: f32 = 0.5;

/// A run of adjacent messages sharing the same coarse topic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterSegment {
    pub member_indices: Vec<usize>,
    pub topic_label: String,
    pub cluster_type: String,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SemanticClusterer;

impl SemanticClusterer {
    pub fn new() -> Self {
        Self
    }

    /// Coarse per-message topic: `anime`, `tech`, `question` or `general`.
    pub fn message_topic(text: &str) -> &'static str {
        let lowered = text.to_lowercase();
        if ANIME_MARKERS.iter().any(|w| TextUtils::contains_word_form(&lowered, w)) {
            "anime"
        } else if TECH_MARKERS.iter().any(|w| TextUtils::contains_word_form(&lowered, w)) {
            "tech"
        } else if text.contains('?') {
            "question"
        } else {
            "general"
        }
    }

    /// Adjacent messages with the same coarse topic always share a segment.
    pub fn cluster<S: AsRef<str>>(&self, messages: &[S]) -> Vec<ClusterSegment> {
        let mut segments: Vec<ClusterSegment> = Vec::new();

        for (i, text) in messages.iter().enumerate() {
            let topic = Self::message_topic(text.as_ref());
            match segments.last_mut() {
                Some(current) if current.topic_label == topic => current.member_indices.push(i),
                _ => segments.push(ClusterSegment {
                    member_indices: vec![i],
                    topic_label: topic.to_string(),
                    cluster_type: TOPIC_SEGMENT.to_string(),
                }),
            }
        }

        segments
    }

    /// Whether the newest message continues the segment before it.
    pub fn has_continuity(segments: &[ClusterSegment]) -> bool {
        segments.last().map_or(false, |s| s.member_indices.len() >= 2)
    }

    /// Mean Jaccard similarity of adjacent members; 1.0 for a single message.
    pub fn coherence<S: AsRef<str>>(texts: &[S]) -> f32 {
        if texts.len() < 2 {
            return 1.0;
        }
        let sets: Vec<_> = texts.iter().map(|t| TextUtils::word_set(t.as_ref())).collect();
        let total: f32 = sets.windows(2).map(|w| TextUtils::jaccard(&w[0], &w[1])).sum();
        total / (sets.len() - 1) as f32
    }

    /// Turns segments over `messages` into persistable clusters.
    pub fn to_clusters(
        &self,
        session_id: &str,
        messages: &[Message],
        segments: &[ClusterSegment],
    ) -> Vec<MessageCluster> {
        segments
            .iter()
            .enumerate()
            .filter_map(|(i, segment)| {
                let members: Vec<&Message> = segment
                    .member_indices
                    .iter()
                    .filter_map(|idx| messages.get(*idx))
                    .collect();
                let first = members.first()?;
                let last = members.last()?;
                let texts: Vec<&str> = members.iter().map(|m| m.text.as_str()).collect();

                Some(MessageCluster {
                    session_id: session_id.to_string(),
                    cluster_id: format!("{}:{}", session_id, i),
                    member_message_ids: members.iter().map(|m| m.id.clone()).collect(),
                    cluster_type: segment.cluster_type.clone(),
                    topic_label: segment.topic_label.clone(),
                    start_time: first.time(),
                    end_time: last.time(),
                    coherence_score: Self::coherence(&texts),
                })
            })
            .collect()
    }

    /// Indices of messages whose word overlap with the target reaches `threshold`.
    pub fn find_related<S: AsRef<str>>(messages: &[S], target_index: usize, threshold: f32) -> Vec<usize> {
        let Some(target) = messages.get(target_index) else {
            return Vec::new();
        };
        let target_words = TextUtils::word_set(target.as_ref());
        if target_words.is_empty() {
            return Vec::new();
        }

        messages
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != target_index)
            .filter(|(_, text)| {
                let words = TextUtils::word_set(text.as_ref());
                !words.is_empty() && TextUtils::jaccard(&target_words, &words) >= threshold
            })
            .map(|(i, _)| i)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_topic() {
        assert_eq!(SemanticClusterer::message_topic("That Episode was wild"), "anime");
        assert_eq!(SemanticClusterer::message_topic("the API is down"), "tech");
        assert_eq!(SemanticClusterer::message_topic("are you free?"), "question");
        assert_eq!(SemanticClusterer::message_topic("rapid growth"), "general");
    }

    #[test]
    fn test_plural_markers_keep_their_topic() {
        assert_eq!(SemanticClusterer::message_topic("the new episodes were great"), "anime");
        assert_eq!(SemanticClusterer::message_topic("those characters are so cool"), "anime");
        assert_eq!(SemanticClusterer::message_topic("these functions return errors"), "tech");

        let segments = SemanticClusterer::new().cluster(&[
            "did you see the new episode",
            "the new episodes were great",
            "those characters are so cool",
        ]);
        assert_eq!(segments.len(), 1);
        assert!(SemanticClusterer::has_continuity(&segments));
    }

    #[test]
    fn test_contiguous_runs_are_merged() {
        let messages = [
            "new episode tonight",
            "that character though",
            "did you eat?",
            "the code is broken",
            "which function?",
            "ok",
        ];
        let segments = SemanticClusterer::new().cluster(&messages);
        let shape: Vec<(&str, Vec<usize>)> = segments
            .iter()
            .map(|s| (s.topic_label.as_str(), s.member_indices.clone()))
            .collect();
        assert_eq!(
            shape,
            vec![
                ("anime", vec![0, 1]),
                ("question", vec![2]),
                ("tech", vec![3, 4]),
                ("general", vec![5]),
            ]
        );
        assert!(segments.iter().all(|s| s.cluster_type == TOPIC_SEGMENT));
        assert!(!SemanticClusterer::has_continuity(&segments));
    }

    #[test]
    fn test_empty_input() {
        let empty: [&str; 0] = [];
        assert!(SemanticClusterer::new().cluster(&empty).is_empty());
        assert!(!SemanticClusterer::has_continuity(&[]));
    }

    #[test]
    fn test_to_clusters() {
        let messages = vec![
            Message::new("m1", "the anime is great", "a", 1_000),
            Message::new("m2", "the anime is long", "b", 2_000),
            Message::new("m3", "ok", "a", 3_000),
        ];
        let clusterer = SemanticClusterer::new();
        let texts: Vec<&str> = messages.iter().map(|m| m.text.as_str()).collect();
        let clusters = clusterer.to_clusters("s1", &messages, &clusterer.cluster(&texts));

        assert_eq!(clusters.len(), 2);
        assert_eq!(clusters[0].cluster_id, "s1:0");
        assert_eq!(clusters[0].member_message_ids, vec!["m1", "m2"]);
        assert!((clusters[0].coherence_score - 0.6).abs() < 1e-6);
        assert_eq!(clusters[0].end_time.timestamp_millis(), 2_000);
        assert_eq!(clusters[1].coherence_score, 1.0);
    }

    #[test]
    fn test_find_related() {
        let messages = [
            "i love the new season",
            "i love the new season too",
            "what time is it",
            "",
        ];
        assert_eq!(SemanticClusterer::find_related(&messages, 0, RELATED_THRESHOLD), vec![1]);
        assert!(SemanticClusterer::find_related(&messages, 3, RELATED_THRESHOLD).is_empty());
        assert!(SemanticClusterer::find_related(&messages, 9, RELATED_THRESHOLD).is_empty());
    }
}
