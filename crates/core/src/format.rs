use crate::types::{Candidate, Scenario, Storyboard, Transcript, VoiceLine};

/// Format seconds as MM:SS timestamp
pub fn format_timestamp(seconds: f64) -> String {
    let seconds = seconds.max(0.0);
    let mins = (seconds / 60.0) as u32;
    let secs = (seconds % 60.0) as u32;
    format!("{:02}:{:02}", mins, secs)
}

/// Format transcript segments with timestamps
pub fn format_transcript_with_timestamps(transcript: &Transcript) -> String {
    transcript
        .segments
        .iter()
        .map(|seg| format!("[{}] {}", format_timestamp(seg.start), seg.text.trim()))
        .collect::<Vec<_>>()
        .join("\n")
}

fn push_voice_lines(output: &mut String, lines: &[VoiceLine]) {
    for line in lines {
        output.push_str(&format!("> **{}:** {}\n", line.role, line.text));
    }
}

pub fn format_scenario_readable(scenario: &Scenario) -> String {
    let mut output = String::new();
    output.push_str(&format!("# {}\n\n", scenario.meta.topic));
    output.push_str(&format!(
        "**Source:** {} | **Scenes:** {} | **Duration:** {}s\n\n",
        scenario.meta.source,
        scenario.scenes.len(),
        scenario.total_duration_sec()
    ));

    let mut clock = 0u64;
    for (index, scene) in scenario.scenes.iter().enumerate() {
        let start = format_timestamp(clock as f64);
        clock += u64::from(scene.duration_sec);
        let end = format_timestamp(clock as f64);
        output.push_str(&format!("## {}. [{}–{}]\n\n", index + 1, start, end));
        output.push_str(&format!("{}\n\n", scene.visual_description));
        push_voice_lines(&mut output, &scene.voice_lines);
        output.push('\n');
    }

    output
}

pub fn format_storyboard_readable(board: &Storyboard) -> String {
    let mut output = String::new();
    output.push_str(&format!(
        "# Storyboard ({}, {}s)\n\n",
        board.target, board.total_duration_sec
    ));

    let mut clock = 0u64;
    for (index, shot) in board.scenes.iter().enumerate() {
        let start = format_timestamp(clock as f64);
        clock += u64::from(shot.scene.duration_sec);
        let end = format_timestamp(clock as f64);
        output.push_str(&format!(
            "## {}. [{}–{}] {} · {}\n\n",
            index + 1,
            start,
            end,
            shot.tempo,
            shot.transitions
        ));
        output.push_str(&format!("{}\n\n", shot.scene.visual_description));
        if !shot.broll_hints.is_empty() {
            output.push_str("**B-roll:**\n");
            for hint in &shot.broll_hints {
                output.push_str(&format!("• {}\n", hint));
            }
            output.push('\n');
        }
        push_voice_lines(&mut output, &shot.scene.voice_lines);
        output.push('\n');
    }

    output
}

pub fn format_candidates_readable(candidates: &[Candidate]) -> String {
    let mut output = String::new();
    for (index, c) in candidates.iter().enumerate() {
        output.push_str(&format!(
            "{}. {} ({})\n   {} views · {} likes · {} · https://www.youtube.com/watch?v={}\n",
            index + 1,
            c.title,
            c.channel_title,
            c.view_count,
            c.like_count,
            c.published_at.format("%Y-%m-%d"),
            c.video_id
        ));
    }
    output
}
