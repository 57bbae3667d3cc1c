//! Prompt text for the vision-language model.
//!
//! Everything here is pure formatting. The same inputs always produce the
//! same bytes, which keeps recorded responses replayable in tests.

/// Context placeholder when the episode has no recorded task.
pub const UNKNOWN_TASK: &str = "unknown";

pub const SYSTEM_PROMPT: &str = r#"Role: You are a professional annotator of robot teleoperation data. You analyse frames sampled from one teleoperation episode and identify the meaningful, complete manipulation actions it contains.

Task:
1. Review the sampled frames in time order.
2. Identify complete actions. Do not over-segment.
   - Granularity: one coherent task step is one action, e.g. "grasp and straighten the cup" or "move and place the box".
   - Never split approaching, grasping, lifting and moving the same object into separate actions.
   - Split only when the robot moves on to a different object or a different goal.
3. Objects: name the manipulated object precisely.
   - Tell similar objects apart by position ("the red cup on the left", "the empty cup on the right").
   - Tell identical objects apart by ordinal ("cup 1", "cup 2").
4. Arm attribution is mandatory. State whether the LEFT arm, the RIGHT arm or BOTH arms perform the action.
   - From the operator's first-person view, the arm on the left side of the image is the left arm and the arm on the right side is the right arm.
   - Look at which arm actually moves and touches the object. Do not assume the right arm by default.
   - Use "both arms" when the arms cooperate.
   - Never use vague subjects such as "the robot arm", "the hand" or "the gripper".
   - Pattern: [left arm | right arm | both arms] + [action] + [object].
5. Temporal segmentation: give a start and end time in seconds for every action.
   - start_time: the moment the arm starts moving towards the target.
   - end_time: the moment the whole operation is finished (object placed, arm settled).

Constraints:
- Aim for 3 to 8 complete actions per episode and scale the count with the duration: about 1 action for a 10 second clip, 2 to 3 for 30 seconds, 5 to 8 for 60 seconds.
- "description" is written in Simplified Chinese, "description_en" is the English translation of the same action.
- Descriptions are short, concrete and executable.
- Output pure JSON only. No markdown, no commentary, no text before or after the object.

Output format:
{
    "actions": [
        {
            "start_time": 0.0,
            "end_time": 5.0,
            "description": "右臂抓取并扶正空纸杯",
            "description_en": "Right arm grasps and straightens the empty paper cup"
        },
        {
            "start_time": 5.0,
            "end_time": 10.5,
            "description": "左臂抓取并扶正左侧的红色纸杯",
            "description_en": "Left arm grasps and straightens the red paper cup on the left"
        }
    ],
    "task_summary": "整理桌面上的纸杯",
    "task_summary_en": "Arrange the paper cups on the table"
}"#;

/// How the frames reach the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameLayout {
    /// One contact sheet, each cell stamped with its timestamp.
    Grid,
    /// Individual images in time order.
    Sequence,
}

/// Per-episode inputs to the user instruction.
#[derive(Debug, Clone, PartialEq)]
pub struct PromptContext<'a> {
    pub duration_secs: f64,
    pub timestamps: &'a [f64],
    pub task: Option<&'a str>,
    pub layout: FrameLayout,
}

pub fn build_user_prompt(ctx: &PromptContext<'_>) -> String {
    let intro = match ctx.layout {
        FrameLayout::Grid => {
            "Analyse this key-frame grid from a robot teleoperation video. Each cell is labelled with its time offset."
        }
        FrameLayout::Sequence => {
            "Analyse this robot teleoperation video. The images below are key frames in time order."
        }
    };
    let points_label = match ctx.layout {
        FrameLayout::Grid => "Grid time points",
        FrameLayout::Sequence => "Key time points",
    };
    let task = ctx
        .task
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .unwrap_or(UNKNOWN_TASK);

    format!(
        "{intro}\n\
         \n\
         Video information:\n\
         - Total duration: {duration:.1}s\n\
         - {points_label}: {points}\n\
         - Task context: {task}\n\
         \n\
         Annotation requirements:\n\
         1. Identify complete actions; do not split them into approach, grasp and move sub-steps.\n\
         2. Attribute every action to the left arm, the right arm or both arms.\n\
         3. Distinguish similar objects by position or ordinal.\n\
         4. {guidance}\n\
         \n\
         Inspect every frame carefully and answer with the required JSON object only.",
        duration = ctx.duration_secs,
        points = format_timestamps(ctx.timestamps),
        guidance = action_count_guidance(ctx.duration_secs),
    )
}

/// `0.0s, 2.0s, 4.0s`
pub fn format_timestamps(timestamps: &[f64]) -> String {
    timestamps
        .iter()
        .map(|t| format!("{:.1}s", t))
        .collect::<Vec<_>>()
        .join(", ")
}

fn action_count_guidance(duration_secs: f64) -> &'static str {
    if duration_secs <= 15.0 {
        "This clip is short: one action is usually enough."
    } else if duration_secs <= 40.0 {
        "For a clip of this length, 2 to 3 actions are expected."
    } else {
        "For a clip of this length, 5 to 8 actions are expected."
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context<'a>(timestamps: &'a [f64], task: Option<&'a str>) -> PromptContext<'a> {
        PromptContext {
            duration_secs: 23.96,
            timestamps,
            task,
            layout: FrameLayout::Grid,
        }
    }

    #[test]
    fn test_prompt_is_reproducible() {
        let stamps = [0.0, 2.0, 4.0];
        let a = build_user_prompt(&context(&stamps, Some("straighten paper cups")));
        let b = build_user_prompt(&context(&stamps, Some("straighten paper cups")));
        assert_eq!(a, b);
    }

    #[test]
    fn test_prompt_contains_duration_points_and_task() {
        let stamps = [0.0, 2.0, 4.5];
        let prompt = build_user_prompt(&context(&stamps, Some("straighten paper cups")));

        assert!(prompt.contains("Total duration: 24.0s"));
        assert!(prompt.contains("Grid time points: 0.0s, 2.0s, 4.5s"));
        assert!(prompt.contains("Task context: straighten paper cups"));
        assert!(prompt.contains("2 to 3 actions"));
    }

    #[test]
    fn test_missing_or_blank_task_becomes_unknown() {
        let stamps = [0.0];
        assert!(build_user_prompt(&context(&stamps, None)).contains("Task context: unknown"));
        assert!(build_user_prompt(&context(&stamps, Some("   "))).contains("Task context: unknown"));
    }

    #[test]
    fn test_sequence_layout_wording() {
        let stamps = [0.0, 1.0];
        let ctx = PromptContext {
            layout: FrameLayout::Sequence,
            ..context(&stamps, None)
        };
        let prompt = build_user_prompt(&ctx);
        assert!(prompt.contains("Key time points: 0.0s, 1.0s"));
        assert!(!prompt.contains("grid"));
    }

    #[test]
    fn test_system_prompt_demands_json_and_arm_attribution() {
        assert!(SYSTEM_PROMPT.contains("Output pure JSON only"));
        assert!(SYSTEM_PROMPT.contains("LEFT arm"));
        assert!(SYSTEM_PROMPT.contains("\"task_summary_en\""));
    }
}
