/// Name used when nothing has been stored yet.
pub const DEFAULT_ASSISTANT_NAME: &str = "Lumi";

/// Longest accepted assistant name, in characters.
pub const MAX_NAME_CHARS: usize = 20;

/// Shown in place of a reply when an exchange fails.
pub const APOLOGY: &str =
    "Entschuldigung, ich habe gerade Verbindungsprobleme. Bitte versuche es gleich noch einmal.";

/// Sampling temperature sent with every exchange.
pub const TEMPERATURE: f32 = 0.7;

const INSTRUCTION_TEMPLATE: &str = r#"Du bist {name}, eine intelligente, freundliche und sehr hilfsbereite KI-Assistentin.

Deine Persönlichkeit:
- Dein Name ist {name}.
- Du bist höflich, warmherzig und empathisch.
- Du sprichst Deutsch.
- Du antwortest präzise, aber mit einer angenehmen, konversationellen Note.
- Du magst es, Menschen zu helfen und Probleme kreativ zu lösen.

Verhalte dich stets natürlich und nicht wie ein Roboter. Wenn du nach deinem Namen gefragt wirst, antworte stolz mit "{name}"."#;

/// Build the behavioral instruction for one exchange.
pub fn system_instruction(assistant_name: &str) -> String {
    INSTRUCTION_TEMPLATE.replace("{name}", assistant_name)
}

pub fn greeting(assistant_name: &str) -> String {
    format!("Hallo! Ich bin {}. Wie kann ich dir heute helfen?", assistant_name)
}

pub fn rename_announcement(new_name: &str) -> String {
    format!("Alles klar! Du kannst mich ab jetzt \"{}\" nennen.", new_name)
}

pub fn typing_indicator(assistant_name: &str) -> String {
    format!("{} schreibt...", assistant_name)
}

pub fn input_placeholder(assistant_name: &str) -> String {
    format!("Schreibe eine Nachricht an {}...", assistant_name)
}

/// Reduce a candidate assistant name to a single capped line.
///
/// Whitespace runs collapse to one space and control characters are dropped.
/// Returns `None` when nothing is left.
pub fn normalize_name(raw: &str) -> Option<String> {
    let collapsed = raw
        .split_whitespace()
        .map(|word| word.chars().filter(|c| !c.is_control()).collect::<String>())
        .filter(|word| !word.is_empty())
        .collect::<Vec<_>>()
        .join(" ");
    if collapsed.is_empty() {
        return None;
    }

    let capped: String = collapsed.chars().take(MAX_NAME_CHARS).collect();
    Some(capped.trim_end().to_string())
}
