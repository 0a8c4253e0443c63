use batch_balance::identity::UNKNOWN_PLAYER;
use batch_balance::{format_amount, BatchEvent, BatchSummary};
use colored::*;

pub fn print_summary(summary: &BatchSummary) {
    println!("{}", "Batch Balance".bold().cyan());
    println!("  Action: {}", summary.action_label());
    println!("  Asset:  {}", summary.asset_type);
    println!(
        "  Total:  {} over {} entries",
        colored_amount(summary.total_amount).bold(),
        summary.entry_count
    );
    if summary.ineligible_count > 0 {
        println!(
            "  {}",
            format!("{} player(s) not in the faction", summary.ineligible_count).yellow()
        );
    }
    println!();

    for (i, row) in summary.rows.iter().enumerate() {
        let mark = if row.done {
            "✓".green()
        } else if i == summary.cursor {
            "→".cyan()
        } else {
            " ".normal()
        };
        let name = if row.display_name.is_empty() {
            UNKNOWN_PLAYER.dimmed()
        } else if row.is_eligible {
            row.display_name.normal()
        } else {
            row.display_name.yellow()
        };
        println!(
            "  {mark} {:>3}. {:<24} [{}] {:>16}",
            i + 1,
            name,
            row.target_id,
            colored_amount(row.amount)
        );
    }
    println!();
    println!("{}", summary.progress_line());
}

pub fn print_event(event: &BatchEvent) {
    let line = event.status_line();
    match event {
        BatchEvent::StepStarted { .. } => println!("{}", line.dimmed()),
        BatchEvent::AwaitingConfirmation { .. } => println!("{}", line.yellow()),
        BatchEvent::Completed { .. } => println!("{}", line.green().bold()),
        BatchEvent::Cleared => println!("{}", line.green()),
        e if e.is_error() => eprintln!("{}", line.red()),
        _ => println!("{line}"),
    }
}

fn colored_amount(amount: i64) -> ColoredString {
    let text = format_amount(amount);
    if amount < 0 {
        text.red()
    } else {
        text.green()
    }
}
