use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Kind of entity a like row can point at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetKind {
    Video,
    Comment,
    Tweet,
}

impl TargetKind {
    /// Value stored in the `likes.target_kind` column.
    pub fn as_str(self) -> &'static str {
        match self {
            TargetKind::Video => "video",
            TargetKind::Comment => "comment",
            TargetKind::Tweet => "tweet",
        }
    }

    /// Table holding the target rows. Only ever one of three literals.
    pub fn table(self) -> &'static str {
        match self {
            TargetKind::Video => "videos",
            TargetKind::Comment => "comments",
            TargetKind::Tweet => "tweets",
        }
    }
}

impl fmt::Display for TargetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            TargetKind::Video => "Video",
            TargetKind::Comment => "Comment",
            TargetKind::Tweet => "Tweet",
        };
        f.write_str(label)
    }
}

/// The thing being liked. Exactly one target per like row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LikeTarget {
    pub kind: TargetKind,
    pub id: Uuid,
}

impl LikeTarget {
    pub fn video(id: Uuid) -> Self {
        Self { kind: TargetKind::Video, id }
    }

    pub fn comment(id: Uuid) -> Self {
        Self { kind: TargetKind::Comment, id }
    }

    pub fn tweet(id: Uuid) -> Self {
        Self { kind: TargetKind::Tweet, id }
    }

    /// Build a target from the three optional ids a caller may send.
    /// Exactly one must be present.
    pub fn from_exclusive(
        video: Option<Uuid>,
        comment: Option<Uuid>,
        tweet: Option<Uuid>,
    ) -> Result<Self, &'static str> {
        match (video, comment, tweet) {
            (Some(id), None, None) => Ok(Self::video(id)),
            (None, Some(id), None) => Ok(Self::comment(id)),
            (None, None, Some(id)) => Ok(Self::tweet(id)),
            (None, None, None) => {
                Err("At least one valid ID (videoId, commentId, or tweetId) is required")
            }
            _ => Err("Only one content ID should be provided at a time"),
        }
    }
}

/// Requested reaction. Parsed from the string booleans `"true"` / `"false"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LikeAction {
    Like,
    Dislike,
}

impl FromStr for LikeAction {
    type Err = &'static str;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "true" => Ok(LikeAction::Like),
            "false" => Ok(LikeAction::Dislike),
            _ => Err("toggleLike parameter must be 'true' or 'false'"),
        }
    }
}

/// Per (target, user) reaction state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reaction {
    None,
    Liked,
    Disliked,
}

/// Storage effect required to move from one reaction to the next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReactionEffect {
    Insert { liked: bool },
    Delete,
    Set { liked: bool },
}

impl Reaction {
    /// State implied by an existing like row's `liked` column, if any.
    pub fn from_row(liked: Option<bool>) -> Self {
        match liked {
            None => Reaction::None,
            Some(true) => Reaction::Liked,
            Some(false) => Reaction::Disliked,
        }
    }

    /// Repeating the current reaction clears it; the opposite one flips it.
    pub fn apply(self, action: LikeAction) -> (Reaction, ReactionEffect) {
        match (self, action) {
            (Reaction::None, LikeAction::Like) => {
                (Reaction::Liked, ReactionEffect::Insert { liked: true })
            }
            (Reaction::None, LikeAction::Dislike) => {
                (Reaction::Disliked, ReactionEffect::Insert { liked: false })
            }
            (Reaction::Liked, LikeAction::Like) | (Reaction::Disliked, LikeAction::Dislike) => {
                (Reaction::None, ReactionEffect::Delete)
            }
            (Reaction::Liked, LikeAction::Dislike) => {
                (Reaction::Disliked, ReactionEffect::Set { liked: false })
            }
            (Reaction::Disliked, LikeAction::Like) => {
                (Reaction::Liked, ReactionEffect::Set { liked: true })
            }
        }
    }
}

/// Result of a toggle: the caller's new state plus fresh totals for the target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LikeSummary {
    pub is_liked: bool,
    pub is_disliked: bool,
    pub total_likes: i64,
    pub total_dislikes: i64,
}

impl LikeSummary {
    pub fn new(state: Reaction, total_likes: i64, total_dislikes: i64) -> Self {
        Self {
            is_liked: state == Reaction::Liked,
            is_disliked: state == Reaction::Disliked,
            total_likes,
            total_dislikes,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transition_table() {
        use LikeAction::*;
        use Reaction as R;

        let cases = [
            (R::None, Like, R::Liked, ReactionEffect::Insert { liked: true }),
            (R::None, Dislike, R::Disliked, ReactionEffect::Insert { liked: false }),
            (R::Liked, Like, R::None, ReactionEffect::Delete),
            (R::Liked, Dislike, R::Disliked, ReactionEffect::Set { liked: false }),
            (R::Disliked, Dislike, R::None, ReactionEffect::Delete),
            (R::Disliked, Like, R::Liked, ReactionEffect::Set { liked: true }),
        ];

        for (from, action, next, effect) in cases {
            assert_eq!(from.apply(action), (next, effect), "{from:?} + {action:?}");
        }
    }

    #[test]
    fn action_accepts_only_string_booleans() {
        assert_eq!("true".parse::<LikeAction>(), Ok(LikeAction::Like));
        assert_eq!("false".parse::<LikeAction>(), Ok(LikeAction::Dislike));
        assert!("TRUE".parse::<LikeAction>().is_err());
        assert!("1".parse::<LikeAction>().is_err());
        assert!("".parse::<LikeAction>().is_err());
    }

    #[test]
    fn target_requires_exactly_one_id() {
        let id = Uuid::new_v4();
        assert_eq!(
            LikeTarget::from_exclusive(None, Some(id), None),
            Ok(LikeTarget::comment(id))
        );
        assert!(LikeTarget::from_exclusive(None, None, None).is_err());
        assert!(LikeTarget::from_exclusive(Some(id), None, Some(id)).is_err());
    }

    #[test]
    fn summary_serializes_camel_case() {
        let summary = LikeSummary::new(Reaction::Disliked, 0, 1);
        let json = serde_json::to_value(summary).unwrap();
        assert_eq!(json["isLiked"], false);
        assert_eq!(json["isDisliked"], true);
        assert_eq!(json["totalDislikes"], 1);
    }
}
