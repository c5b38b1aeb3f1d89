//! 检测结果 → 运动命令
//!
//! 纯函数映射，无隐藏状态：相同输入永远得到相同命令。
//! 类别的含义由注入的 [`TriggerTable`] 决定，而不是写死在逻辑里。

use rover_hal::Detection;
use rover_protocol::Command;
use std::collections::BTreeMap;

/// 触发优先级
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TriggerTier {
    /// 出现即前进（最高优先级）
    Forward,
    /// 出现即左转
    Turn,
    /// 明确要求停车（与兜底结果相同，仅用于记录类别含义）
    Halt,
}

/// 类别 → 优先级表
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TriggerTable {
    tiers: BTreeMap<u32, TriggerTier>,
}

/// COCO: 0 = person
pub const DEFAULT_FORWARD_CLASS: u32 = 0;
/// COCO: 2 = car
pub const DEFAULT_TURN_CLASS: u32 = 2;
/// COCO: 67 = cell phone（原型中用作"停车牌"）
pub const DEFAULT_HALT_CLASS: u32 = 67;

impl Default for TriggerTable {
    fn default() -> Self {
        Self::empty()
            .with(DEFAULT_FORWARD_CLASS, TriggerTier::Forward)
            .with(DEFAULT_TURN_CLASS, TriggerTier::Turn)
            .with(DEFAULT_HALT_CLASS, TriggerTier::Halt)
    }
}

impl TriggerTable {
    pub fn empty() -> Self {
        Self {
            tiers: BTreeMap::new(),
        }
    }

    /// 登记一个类别（重复登记以最后一次为准）
    pub fn with(mut self, class_id: u32, tier: TriggerTier) -> Self {
        self.tiers.insert(class_id, tier);
        self
    }

    pub fn from_lists(forward: &[u32], turn: &[u32], halt: &[u32]) -> Self {
        let mut table = Self::empty();
        for (ids, tier) in [
            (halt, TriggerTier::Halt),
            (turn, TriggerTier::Turn),
            (forward, TriggerTier::Forward),
        ] {
            for &id in ids {
                table = table.with(id, tier);
            }
        }
        table
    }

    pub fn tier(&self, class_id: u32) -> Option<TriggerTier> {
        self.tiers.get(&class_id).copied()
    }

    fn contains_tier(&self, classes: &[u32], tier: TriggerTier) -> bool {
        classes.iter().any(|&c| self.tier(c) == Some(tier))
    }
}

/// 转向策略
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SteeringMode {
    /// 只看类别集合
    #[default]
    Classes,
    /// 前进触发目标的水平位置决定左/右/直行
    BoundingBox,
}

/// 中心点比例低于该值时左转
pub const LEFT_RATIO: f32 = 0.35;
/// 中心点比例高于该值时右转
pub const RIGHT_RATIO: f32 = 0.65;

#[derive(Debug, Clone, Default)]
pub struct CommandMapper {
    table: TriggerTable,
    steering: SteeringMode,
}

impl CommandMapper {
    pub fn new(table: TriggerTable, steering: SteeringMode) -> Self {
        Self { table, steering }
    }

    pub fn table(&self) -> &TriggerTable {
        &self.table
    }

    pub fn steering(&self) -> SteeringMode {
        self.steering
    }

    /// 按优先级映射类别集合
    ///
    /// 空 → STOP；含前进类 → FORWARD；否则含转向类 → LEFT；否则 STOP。
    pub fn map_classes(&self, classes: &[u32]) -> Command {
        if classes.is_empty() {
            Command::Stop
        } else if self.table.contains_tier(classes, TriggerTier::Forward) {
            Command::Forward
        } else if self.table.contains_tier(classes, TriggerTier::Turn) {
            Command::Left
        } else {
            Command::Stop
        }
    }

    /// 映射检测结果
    ///
    /// `SteeringMode::BoundingBox` 下，取置信度最高的前进类目标（并列取先出现者），
    /// 按其中心点在画面中的水平比例决定方向。`frame_width` 为 0（尺寸未知）时
    /// 退回类别规则。
    pub fn map_detections(&self, detections: &[Detection], frame_width: u32) -> Command {
        if self.steering == SteeringMode::BoundingBox && frame_width > 0 {
            let mut best: Option<&Detection> = None;
            for det in detections {
                if self.table.tier(det.class_id) != Some(TriggerTier::Forward) {
                    continue;
                }
                if best.is_none_or(|b| det.confidence > b.confidence) {
                    best = Some(det);
                }
            }
            if let Some(target) = best {
                return steer(target.bbox.center_x() / frame_width as f32);
            }
        }

        let classes: Vec<u32> = detections.iter().map(|d| d.class_id).collect();
        self.map_classes(&classes)
    }
}

fn steer(ratio: f32) -> Command {
    if ratio < LEFT_RATIO {
        Command::Left
    } else if ratio > RIGHT_RATIO {
        Command::Right
    } else {
        Command::Forward
    }
}
