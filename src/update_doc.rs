use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::errors::{Error, Result};
use crate::models::{
    ChangeType, Confidence, Hunk, Proposal, Reason, ScanResult, Trigger, TriggerDetails, utc_now,
};
use crate::semantic::construct::ConstructKind;

pub const SCHEMA_VERSION: u32 = 1;

/// The update document exchanged between a scan and the updater.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateDoc {
    pub schema_version: u32,
    pub generated_at: String,
    pub base_ref: String,
    pub target_ref: String,
    #[serde(default)]
    pub triggers: Vec<TriggerDoc>,
    #[serde(default)]
    pub proposals: Vec<ProposalDoc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriggerDoc {
    pub subscription_id: String,
    pub path: String,
    pub start_line: u32,
    pub end_line: u32,
    pub reasons: Vec<Reason>,
    pub label: Option<String>,
    pub matching_hunks: Vec<Hunk>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub change_type: Option<ChangeType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<TriggerDetails>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProposalDoc {
    pub subscription_id: String,
    pub old_path: String,
    pub old_start: u32,
    pub old_end: u32,
    pub new_path: String,
    pub new_start: u32,
    pub new_end: u32,
    pub reasons: Vec<Reason>,
    pub confidence: Confidence,
    pub shift: Option<i64>,
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_qualname: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_kind: Option<ConstructKind>,
}

impl From<&Trigger> for TriggerDoc {
    fn from(trigger: &Trigger) -> Self {
        Self {
            subscription_id: trigger.subscription.id.clone(),
            path: trigger.path.clone(),
            start_line: trigger.start_line,
            end_line: trigger.end_line,
            reasons: trigger.reasons.clone(),
            label: trigger.subscription.label.clone(),
            matching_hunks: trigger.matching_hunks.clone(),
            change_type: trigger.change_type,
            details: trigger.details.clone(),
        }
    }
}

impl From<&Proposal> for ProposalDoc {
    fn from(proposal: &Proposal) -> Self {
        Self {
            subscription_id: proposal.subscription.id.clone(),
            old_path: proposal.old_path.clone(),
            old_start: proposal.old_start,
            old_end: proposal.old_end,
            new_path: proposal.new_path.clone(),
            new_start: proposal.new_start,
            new_end: proposal.new_end,
            reasons: proposal.reasons.clone(),
            confidence: proposal.confidence,
            shift: proposal.shift,
            label: proposal.subscription.label.clone(),
            new_qualname: proposal.new_qualname.clone(),
            new_kind: proposal.new_kind,
        }
    }
}

/// Build the update document for a scan result.
pub fn from_scan(result: &ScanResult) -> UpdateDoc {
    UpdateDoc {
        schema_version: SCHEMA_VERSION,
        generated_at: utc_now(),
        base_ref: result.base_ref.clone(),
        target_ref: result.target_ref.clone(),
        triggers: result.triggers.iter().map(TriggerDoc::from).collect(),
        proposals: result.proposals.iter().map(ProposalDoc::from).collect(),
    }
}

pub fn read_update_doc(path: &Path) -> Result<UpdateDoc> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| Error::io(format!("reading {}", path.display()), e))?;
    serde_json::from_str(&text).map_err(|e| Error::json(path.display().to_string(), e))
}

pub fn write_update_doc(result: &ScanResult, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| Error::io(format!("creating {}", parent.display()), e))?;
    }

    let doc = from_scan(result);
    let mut text =
        serde_json::to_string_pretty(&doc).map_err(|e| Error::json("update document", e))?;
    text.push('\n');
    std::fs::write(path, text).map_err(|e| Error::io(format!("writing {}", path.display()), e))
}

/// Human-readable markdown summary of a scan.
pub fn render_markdown(result: &ScanResult) -> String {
    let mut lines: Vec<String> = vec![
        "# Code Subscription Scan Report".into(),
        String::new(),
        format!("**Base:** `{}`", short_ref(&result.base_ref)),
        format!("**Target:** `{}`", short_ref(&result.target_ref)),
        format!("**Generated:** {}", utc_now()),
        String::new(),
        "## Summary".into(),
        String::new(),
        format!("- **Triggered:** {}", result.triggers.len()),
        format!("- **Proposed Updates:** {}", result.proposals.len()),
        format!("- **Unchanged:** {}", result.unchanged.len()),
        String::new(),
    ];

    if !result.triggers.is_empty() {
        lines.push("## Triggered Subscriptions".into());
        lines.push(String::new());

        for trigger in &result.triggers {
            let sub = &trigger.subscription;
            let label = sub.label.as_deref().map(|l| format!(" ({l})")).unwrap_or_default();
            lines.push(format!("### `{}`{label}", short_id(&sub.id)));
            lines.push(String::new());
            lines.push(format!(
                "- **Location:** `{}:{}-{}`",
                trigger.path, trigger.start_line, trigger.end_line
            ));
            lines.push(format!("- **Reason:** {}", join_reasons(&trigger.reasons)));
            if let Some(change_type) = trigger.change_type {
                lines.push(format!("- **Change type:** {change_type}"));
            }
            if let Some(description) = &sub.description {
                lines.push(format!("- **Description:** {description}"));
            }

            if let Some(anchors) = &sub.anchors {
                lines.push(String::new());
                lines.push("**Watched lines:**".into());
                lines.push("```".into());
                lines.extend(anchors.lines.iter().cloned());
                lines.push("```".into());
            }
            lines.push(String::new());
        }
    }

    if !result.proposals.is_empty() {
        lines.push("## Proposed Updates".into());
        lines.push(String::new());

        for prop in &result.proposals {
            let sub = &prop.subscription;
            let label = sub.label.as_deref().map(|l| format!(" ({l})")).unwrap_or_default();
            lines.push(format!("### `{}`{label}", short_id(&sub.id)));
            lines.push(String::new());
            lines.push(format!(
                "- **Old:** `{}:{}-{}`",
                prop.old_path, prop.old_start, prop.old_end
            ));
            lines.push(format!(
                "- **New:** `{}:{}-{}`",
                prop.new_path, prop.new_start, prop.new_end
            ));
            lines.push(format!("- **Reason:** {}", join_reasons(&prop.reasons)));
            if let Some(shift) = prop.shift {
                lines.push(format!("- **Shift:** {shift:+} lines"));
            }
            lines.push(String::new());
        }
    }

    if !result.unchanged.is_empty() {
        lines.push("## Unchanged Subscriptions".into());
        lines.push(String::new());
        for sub in &result.unchanged {
            let label = sub.label.as_deref().map(|l| format!(" ({l})")).unwrap_or_default();
            lines.push(format!(
                "- `{}`{label} - `{}:{}-{}`",
                short_id(&sub.id),
                sub.path,
                sub.start_line,
                sub.end_line
            ));
        }
        lines.push(String::new());
    }

    lines.join("\n")
}

pub fn write_markdown_doc(result: &ScanResult, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| Error::io(format!("creating {}", parent.display()), e))?;
    }
    std::fs::write(path, render_markdown(result))
        .map_err(|e| Error::io(format!("writing {}", path.display()), e))
}

fn short_ref(r: &str) -> &str {
    &r[..r.len().min(12)]
}

fn short_id(id: &str) -> &str {
    &id[..id.len().min(8)]
}

fn join_reasons(reasons: &[Reason]) -> String {
    reasons.iter().map(|r| r.as_str()).collect::<Vec<_>>().join(", ")
}
