use indicatif::{ProgressBar, ProgressStyle};

fn style(template: &str) -> ProgressStyle {
    ProgressStyle::with_template(template).unwrap_or_else(|_| ProgressStyle::default_spinner())
}

/// A spinner on stderr. Hidden when stderr is not a terminal.
pub fn make_progress_spinner(message: String) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.enable_steady_tick(std::time::Duration::from_millis(120));
    pb.set_style(style("{spinner:.blue} {msg}").tick_strings(&[
        "▹▹▹▹▹",
        "▸▹▹▹▹",
        "▹▸▹▹▹",
        "▹▹▸▹▹",
        "▹▹▹▸▹",
        "▹▹▹▹▸",
        "▪▪▪▪▪",
    ]));
    pb.set_message(message);
    pb
}

/// Finish the spinner with a message that reflects how the step went.
pub fn complete_progress_spinner<T, E>(pb: ProgressBar, result: &Result<T, E>, done: String) {
    let (template, message) = match result {
        Ok(_) => ("{msg:.cyan/blue}", format!("✅ {done}")),
        Err(_) => ("{msg:.red.bold}", format!("❌ {}", pb.message())),
    };
    pb.set_style(style(template));
    pb.finish_with_message(message);
}
