//! Prompt assembly for the turn engine and the gardener's LLM passes.

use valet_memory::{BehavioralPatterns, MemoryEntry, MemoryType, RetrievedMemory};

/// Build the system prompt for one turn: identity, profile, retrieved
/// memories, recent affect, and the skill index.
pub fn system_prompt(
    identity: &str,
    profile: &[MemoryEntry],
    retrieved: &[RetrievedMemory],
    patterns: Option<&BehavioralPatterns>,
    skills_index: &str,
) -> String {
    let mut out = String::new();
    out.push_str(identity);
    out.push_str("\n\n");

    if !profile.is_empty() {
        out.push_str("## About the user\n");
        for entry in profile {
            out.push_str("- ");
            out.push_str(&entry.content);
            out.push('\n');
        }
        out.push('\n');
    }

    if !retrieved.is_empty() {
        out.push_str("## Relevant memories\n");
        for hit in retrieved {
            out.push_str("- ");
            out.push_str(&hit.content);
            out.push('\n');
        }
        out.push('\n');
    }

    if let Some(p) = patterns {
        out.push_str(&format!(
            "## Recent context\nThe user has seemed {} lately",
            p.emotion
        ));
        if let Some(goal) = &p.goal_signal {
            out.push_str(&format!("; current focus: {goal}"));
        }
        out.push_str(".\n\n");
    }

    if !skills_index.is_empty() {
        out.push_str("## Available skills\n");
        out.push_str(skills_index);
        out.push('\n');
    }

    out
}

/// Profile entries injected into every prompt: static plus dynamic profile
/// memories, static first.
pub fn profile_entries(entries: &[MemoryEntry]) -> Vec<MemoryEntry> {
    let mut profile: Vec<MemoryEntry> = entries
        .iter()
        .filter(|e| {
            e.is_latest
                && matches!(
                    e.memory_type,
                    MemoryType::StaticProfile | MemoryType::DynamicProfile
                )
        })
        .cloned()
        .collect();
    profile.sort_by_key(|e| match e.memory_type {
        MemoryType::StaticProfile => 0,
        _ => 1,
    });
    profile
}

/// Sub-agent system prompt: identity, task, optional profile, rules.
pub fn subagent_prompt(task: &str, profile: &[MemoryEntry], retrieved: &[RetrievedMemory]) -> String {
    let mut out = String::from(
        "You are a focused background worker helping a personal assistant. \
         Complete the task below using the available skills, then answer \
         with the result followed by [DONE].\n\n",
    );
    if !profile.is_empty() {
        out.push_str("## User context\n");
        for entry in profile {
            out.push_str("- ");
            out.push_str(&entry.content);
            out.push('\n');
        }
        out.push('\n');
    }
    if !retrieved.is_empty() {
        out.push_str("## Possibly relevant memories\n");
        for hit in retrieved {
            out.push_str("- ");
            out.push_str(&hit.content);
            out.push('\n');
        }
        out.push('\n');
    }
    out.push_str("## Task\n");
    out.push_str(task);
    out.push_str(
        "\n\n## Rules\n\
         - Stay on task; do not message the user directly.\n\
         - End your final answer with [DONE].\n",
    );
    out
}

/// Session summarization prompt.
pub fn summary_prompt(transcript: &str) -> String {
    format!(
        "Summarize this conversation between a user and their assistant in \
         3-5 sentences. Capture decisions, open threads, and anything worth \
         remembering about the user.\n\n{transcript}"
    )
}

/// Self-reflection prompt over recent session summaries.
pub fn reflection_prompt(summaries: &[String]) -> String {
    let mut out = String::from(
        "Below are summaries of recent conversations with the user. Write \
         one concise insight about the user's current situation, habits, or \
         needs that is not already obvious from any single conversation. \
         Answer with the insight text only.\n\n",
    );
    for (i, s) in summaries.iter().enumerate() {
        out.push_str(&format!("{}. {}\n", i + 1, s));
    }
    out
}

/// Affect-inference prompt; expects a JSON object back.
pub fn affect_prompt(summaries: &[String]) -> String {
    let mut out = String::from(
        "From the conversation summaries below, estimate the user's current \
         state. Respond with JSON only: {\"valence\": number in [-1,1], \
         \"arousal\": number in [0,1], \"emotion\": short word, \
         \"goal_signal\": string or null}.\n\n",
    );
    for s in summaries {
        out.push_str("- ");
        out.push_str(s);
        out.push('\n');
    }
    out
}

/// Inner-thoughts prompt; expects a JSON array of candidate follow-ups.
pub fn inner_thoughts_prompt(patterns: &BehavioralPatterns, summaries: &[String]) -> String {
    let mut out = format!(
        "You are the background reasoning of a personal assistant. The user \
         has seemed {} lately. Given the recent conversation summaries, \
         propose follow-ups worth raising later, if any. Respond with JSON \
         only: [{{\"message\": string, \"hours_from_now\": number}}]. \
         Propose nothing unless genuinely useful.\n\n",
        patterns.emotion
    );
    for s in summaries {
        out.push_str("- ");
        out.push_str(s);
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use valet_memory::MemoryCategory;

    #[test]
    fn system_prompt_sections_in_order() {
        let mut profile_entry =
            MemoryEntry::new("u1", "Name is Ada", MemoryCategory::Fact, 10);
        profile_entry.memory_type = MemoryType::StaticProfile;

        let prompt = system_prompt(
            "You are Valet.",
            &[profile_entry],
            &[],
            None,
            "- shell: run a command",
        );
        let identity_pos = prompt.find("You are Valet").unwrap();
        let profile_pos = prompt.find("About the user").unwrap();
        let skills_pos = prompt.find("Available skills").unwrap();
        assert!(identity_pos < profile_pos);
        assert!(profile_pos < skills_pos);
    }

    #[test]
    fn profile_entries_static_first_latest_only() {
        let mut stat = MemoryEntry::new("u1", "static", MemoryCategory::Fact, 10);
        stat.memory_type = MemoryType::StaticProfile;
        let mut dynamic = MemoryEntry::new("u1", "dynamic", MemoryCategory::Fact, 5);
        dynamic.memory_type = MemoryType::DynamicProfile;
        let mut old = MemoryEntry::new("u1", "old", MemoryCategory::Fact, 5);
        old.memory_type = MemoryType::StaticProfile;
        old.is_latest = false;
        let regular = MemoryEntry::new("u1", "regular", MemoryCategory::Fact, 5);

        let profile = profile_entries(&[dynamic, stat, old, regular]);
        assert_eq!(profile.len(), 2);
        assert_eq!(profile[0].content, "static");
        assert_eq!(profile[1].content, "dynamic");
    }

    #[test]
    fn subagent_prompt_carries_task_and_sentinel_rule() {
        let prompt = subagent_prompt("count the files", &[], &[]);
        assert!(prompt.contains("count the files"));
        assert!(prompt.contains("[DONE]"));
    }
}
