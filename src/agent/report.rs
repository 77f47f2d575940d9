// src/agent/report.rs

use crate::model::{LoopState, TaskReport};
use colored::Colorize;

pub fn print_summary(report: &TaskReport) {
    let rule = "=".repeat(70);
    let status = match report.state {
        LoopState::Done => "✅ completed".green().bold(),
        LoopState::Cancelled => "⏸️  cancelled".yellow().bold(),
        LoopState::TimedOut => "⏱️  timed out".yellow().bold(),
        LoopState::MaxStepsReached => "⚠️  max steps reached".yellow().bold(),
        other => format!("❌ {}", other).red().bold(),
    };

    println!("\n{}", rule);
    println!("{}", "📊 SUMMARY".bold());
    println!("{}", rule);
    println!("Task: {}", report.task);
    println!("Status: {}", status);
    if let Some(reason) = &report.failure {
        println!("Cause: {}", reason.red());
    }
    println!("Steps: {}", report.steps);
    println!("Duration: {:.1}s", report.elapsed.as_secs_f64());
    println!("Avg. time/step: {:.1}s", report.average_step().as_secs_f64());
    println!("Actions executed: {}", report.total_actions);
    println!("Failed actions: {}", report.failed_actions);
    println!("API requests: {}", report.requests);
    println!("{}\n", rule);
}
