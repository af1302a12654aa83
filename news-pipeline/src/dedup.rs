use crate::normalize::jaccard;
use crate::types::{AlternateSource, DedupConfig, Story};
use std::cmp::{Ordering, Reverse};
use tracing::{debug, info};

/// Result of one deduplication pass.
#[derive(Debug)]
pub struct DedupOutcome {
    pub stories: Vec<Story>,
    /// Number of input stories folded into another story's alternates.
    pub merged: usize,
}

/// Cross-source near-duplicate removal over title shingle sets.
pub struct Deduplicator {
    threshold: f64,
}

struct Cluster {
    first_index: usize,
    winner: Story,
    members: Vec<Story>,
}

impl Cluster {
    fn absorb(&mut self, other: Cluster) {
        self.first_index = self.first_index.min(other.first_index);
        let mut challenger = other.winner;
        if outranks(&challenger, &self.winner) {
            std::mem::swap(&mut challenger, &mut self.winner);
        }
        self.members.push(challenger);
        self.members.extend(other.members);
    }

    fn finish(self) -> Story {
        let Cluster {
            mut winner, members, ..
        } = self;

        let mut alternates = std::mem::take(&mut winner.alternate_sources);
        for member in members {
            alternates.push(AlternateSource {
                source_name: member.source_name.clone(),
                title: member.title.clone(),
                link: member.link.clone(),
            });
            alternates.extend(member.alternate_sources);
        }

        // The same feed listed twice is not a second citation
        let mut kept: Vec<AlternateSource> = Vec::with_capacity(alternates.len());
        for alt in alternates {
            let repeats_winner = alt.source_name == winner.source_name && alt.link == winner.link;
            let seen = kept
                .iter()
                .any(|k| k.source_name == alt.source_name && k.link == alt.link);
            if !repeats_winner && !seen {
                kept.push(alt);
            }
        }

        winner.alternate_sources = kept;
        winner.mark_deduplicated();
        winner
    }
}

/// Ordering key: heavier source first, then feed-dated stories by earliest
/// date, then fetch order. Stories whose date is the fetch-time estimate
/// sort after dated ones of the same weight.
fn rank_key(story: &Story) -> (Reverse<u32>, bool, Option<i64>, usize) {
    let date = (!story.published_estimated).then(|| story.published_at.timestamp_millis());
    (
        Reverse(story.source_weight),
        story.published_estimated,
        date,
        story.fetch_order,
    )
}

/// True when `a` should be kept over `b`.
pub fn outranks(a: &Story, b: &Story) -> bool {
    rank_key(a).cmp(&rank_key(b)) == Ordering::Less
}

impl Deduplicator {
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }

    pub fn from_config(config: &DedupConfig) -> Self {
        Self::new(config.similarity_threshold)
    }

    pub fn is_same_story(&self, a: &Story, b: &Story) -> bool {
        a.id == b.id || jaccard(&a.cluster_key, &b.cluster_key) >= self.threshold
    }

    /// Merge near-duplicates. Repeats until no two surviving stories are
    /// similar, so feeding the output back in merges nothing.
    pub fn deduplicate(&self, stories: Vec<Story>) -> DedupOutcome {
        let input_len = stories.len();
        let mut clusters: Vec<Cluster> = stories
            .into_iter()
            .enumerate()
            .map(|(first_index, winner)| Cluster {
                first_index,
                winner,
                members: Vec::new(),
            })
            .collect();

        let mut passes = 0;
        loop {
            passes += 1;
            let mut merged_any = false;
            let mut next: Vec<Cluster> = Vec::with_capacity(clusters.len());

            for cluster in clusters {
                match next
                    .iter()
                    .position(|existing| self.is_same_story(&existing.winner, &cluster.winner))
                {
                    Some(pos) => {
                        debug!(
                            "Merging '{}' ({}) into '{}' ({})",
                            cluster.winner.title,
                            cluster.winner.source_name,
                            next[pos].winner.title,
                            next[pos].winner.source_name
                        );
                        next[pos].absorb(cluster);
                        merged_any = true;
                    }
                    None => next.push(cluster),
                }
            }

            clusters = next;
            if !merged_any {
                break;
            }
        }

        clusters.sort_by_key(|c| c.first_index);
        let stories: Vec<Story> = clusters.into_iter().map(Cluster::finish).collect();
        let merged = input_len - stories.len();

        info!(
            "Deduplicated {} stories into {} ({} merged, {} passes)",
            input_len,
            stories.len(),
            merged,
            passes
        );

        DedupOutcome { stories, merged }
    }
}
