//! 多模型投票 - 将多个检测模型的结果合并为共识检测
//!
//! 1. 按模型调用顺序遍历检测结果，同类且 IoU ≥ 阈值则并入已有分组
//! 2. 分组中不同模型数 ≥ 投票阈值才输出
//! 3. 输出框为成员坐标均值，置信度取最大值

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use super::types::{BoundingBox, Detection};

/// How a detection picks the group it joins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchPolicy {
    /// First group (creation order) holding a same-class member with IoU ≥ threshold.
    #[default]
    FirstMatch,
    /// Group holding the same-class member with the highest IoU ≥ threshold;
    /// ties go to the earlier group. Not bit-compatible with `FirstMatch`.
    BestMatch,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsensusConfig {
    pub iou_threshold: f64,
    pub voting_threshold: usize,
    pub match_policy: MatchPolicy,
}

impl Default for ConsensusConfig {
    fn default() -> Self {
        Self {
            iou_threshold: 0.5,
            voting_threshold: 2,
            match_policy: MatchPolicy::FirstMatch,
        }
    }
}

pub struct ConsensusVoter {
    iou_threshold: f64,
    voting_threshold: usize,
    match_policy: MatchPolicy,
}

impl ConsensusVoter {
    /// `configured_models` caps the voting threshold so it stays reachable
    /// with every configured model alive. It is not lowered when models fail later.
    pub fn new(config: &ConsensusConfig, configured_models: usize) -> Self {
        let voting_threshold = config.voting_threshold.min(configured_models).max(1);
        Self {
            iou_threshold: config.iou_threshold,
            voting_threshold,
            match_policy: config.match_policy,
        }
    }

    pub fn voting_threshold(&self) -> usize {
        self.voting_threshold
    }

    /// Group detections (given in model invocation order) and emit one
    /// consensus detection per group with enough distinct voters, in group
    /// creation order.
    pub fn vote(&self, detections: &[Detection]) -> Vec<Detection> {
        if detections.is_empty() {
            return Vec::new();
        }

        let groups = self.group(detections);

        groups
            .iter()
            .filter_map(|group| self.merge_group(group))
            .collect()
    }

    fn group<'a>(&self, detections: &'a [Detection]) -> Vec<Vec<&'a Detection>> {
        let mut groups: Vec<Vec<&Detection>> = Vec::new();

        for det in detections {
            let target = match self.match_policy {
                MatchPolicy::FirstMatch => self.first_match(&groups, det),
                MatchPolicy::BestMatch => self.best_match(&groups, det),
            };

            match target {
                Some(idx) => groups[idx].push(det),
                None => groups.push(vec![det]),
            }
        }

        groups
    }

    fn joins(&self, det: &Detection, member: &Detection) -> Option<f64> {
        if det.class_id != member.class_id {
            return None;
        }
        let iou = det.bbox.iou(&member.bbox);
        (iou >= self.iou_threshold).then_some(iou)
    }

    fn first_match(&self, groups: &[Vec<&Detection>], det: &Detection) -> Option<usize> {
        groups
            .iter()
            .position(|group| group.iter().any(|member| self.joins(det, member).is_some()))
    }

    fn best_match(&self, groups: &[Vec<&Detection>], det: &Detection) -> Option<usize> {
        let mut best: Option<(usize, f64)> = None;
        for (idx, group) in groups.iter().enumerate() {
            for member in group {
                if let Some(iou) = self.joins(det, member) {
                    if best.map_or(true, |(_, b)| iou > b) {
                        best = Some((idx, iou));
                    }
                }
            }
        }
        best.map(|(idx, _)| idx)
    }

    fn merge_group(&self, group: &[&Detection]) -> Option<Detection> {
        let first = group.first()?;

        let voters: BTreeSet<&str> = group.iter().map(|d| d.model_source.as_str()).collect();
        if voters.len() < self.voting_threshold {
            return None;
        }

        let n = group.len() as i64;
        let mean = |f: fn(&BoundingBox) -> i32| -> i32 {
            let sum: i64 = group.iter().map(|d| f(&d.bbox) as i64).sum();
            (sum / n) as i32
        };
        let bbox = BoundingBox::new(
            mean(|b| b.x1),
            mean(|b| b.y1),
            mean(|b| b.x2),
            mean(|b| b.y2),
        );

        let confidence = group
            .iter()
            .map(|d| d.confidence)
            .fold(f32::NEG_INFINITY, f32::max);

        Some(Detection {
            bbox,
            confidence,
            class_id: first.class_id,
            class_name: first.class_name.clone(),
            model_source: voters.into_iter().collect::<Vec<_>>().join(","),
        })
    }
}
