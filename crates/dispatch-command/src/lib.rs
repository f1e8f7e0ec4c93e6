//! Agent Command Builder (spec §4.2, component C2).
//!
//! Deterministic, side-effect-free composition of the command string
//! dispatched into a Sprite (or a local child process, via [`build_args`]).
//! Grounded on the teacher's `skynet-agent::claude_cli` command assembly —
//! same idea of "build the exact argv/string the CLI expects" — generalized
//! to the spec's fixed escaping rules and the two agent-kind templates
//! instead of one concrete `claude -p` invocation.

mod escape;

pub use escape::escape_double_quoted;

/// Which agent flavor the command is being built for. Each has its own
/// invocation shape (spec §4.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentKind {
    /// `claude`-family CLI: `<agent> --flags --session-id "<s>" -p "<m>"`.
    ClaudeStyle,
    /// `opencode`-family CLI: a small shell pipeline that sets `NO_COLOR=1`,
    /// optionally seeds a config file, runs the agent, and strips ANSI
    /// escapes from its output.
    OpencodeStyle,
}

/// Fixed boilerplate flags for the claude-style invocation. Not
/// user-controlled, so no escaping is needed here.
const CLAUDE_FLAGS: &str = "--dangerously-skip-permissions --output-format stream-json";

/// ANSI-stripping filter appended to the opencode-style pipeline. `sed` is
/// available on every Sprite base image; this avoids depending on a
/// dedicated `ansi2txt`/`strip-ansi` binary being present.
const ANSI_STRIP_FILTER: &str = r#"sed -r 's/\x1b\[[0-9;]*[a-zA-Z]//g'"#;

/// Optional per-call knobs for [`build_shell_command`].
#[derive(Debug, Clone, Default)]
pub struct BuildOptions {
    /// For `opencode-style` only: JSON config content to seed before the
    /// agent runs. When `None`, no seed step is emitted (the pipeline opens
    /// directly with `NO_COLOR=1 opencode ...`).
    pub seed_config_json: Option<String>,
    /// Agent binary name/path to invoke. Defaults to `"claude"` or
    /// `"opencode"` depending on [`AgentKind`] when left `None`.
    pub agent_binary: Option<String>,
}

fn default_binary(kind: AgentKind) -> &'static str {
    match kind {
        AgentKind::ClaudeStyle => "claude",
        AgentKind::OpencodeStyle => "opencode",
    }
}

/// Build a single shell command string safe to embed in
/// `["/bin/sh", "-c", cmd]` (spec §4.2).
///
/// `message` and `session_id` are untrusted (user-supplied) and are run
/// through [`escape_double_quoted`] before being embedded in a
/// double-quoted shell argument. Semicolons, pipes, redirects, and globs
/// are preserved verbatim — they're harmless inside double quotes — so
/// ordinary user messages stay readable in logs.
pub fn build_shell_command(
    message: &str,
    session_id: &str,
    kind: AgentKind,
    opts: &BuildOptions,
) -> String {
    let binary = opts
        .agent_binary
        .as_deref()
        .unwrap_or_else(|| default_binary(kind));
    let esc_msg = escape_double_quoted(message);
    let esc_session = escape_double_quoted(session_id);

    match kind {
        AgentKind::ClaudeStyle => {
            format!(
                r#"{binary} {flags} --session-id "{session}" -p "{msg}""#,
                binary = binary,
                flags = CLAUDE_FLAGS,
                session = esc_session,
                msg = esc_msg,
            )
        }
        AgentKind::OpencodeStyle => {
            let mut stages: Vec<String> = Vec::new();

            if let Some(config) = &opts.seed_config_json {
                let esc_config = escape_double_quoted(config);
                stages.push(format!(
                    r#"mkdir -p "$HOME/.config/opencode" && printf '%s' "{config}" > "$HOME/.config/opencode/config.json""#,
                    config = esc_config
                ));
            }

            let run_stage = format!(
                r#"NO_COLOR=1 {binary} run --session "{session}" "{msg}""#,
                binary = binary,
                session = esc_session,
                msg = esc_msg,
            );

            if stages.is_empty() {
                format!("{run_stage} | {ANSI_STRIP_FILTER}")
            } else {
                format!("{} && {run_stage} | {ANSI_STRIP_FILTER}", stages.join(" && "))
            }
        }
    }
}

/// Build the argv elements for a *direct* (non-shell) process invocation.
///
/// Unlike [`build_shell_command`], `message` and `session_id` are returned
/// **untouched** — shell escaping would double-quote content that the OS
/// is about to hand to the child process as a single argv element anyway
/// (spec §4.2).
pub fn build_args(message: &str, session_id: &str, kind: AgentKind, opts: &BuildOptions) -> Vec<String> {
    let binary = opts
        .agent_binary
        .as_deref()
        .unwrap_or_else(|| default_binary(kind))
        .to_string();

    match kind {
        AgentKind::ClaudeStyle => {
            let mut args = vec![binary];
            args.extend(CLAUDE_FLAGS.split_whitespace().map(str::to_string));
            args.push("--session-id".to_string());
            args.push(session_id.to_string());
            args.push("-p".to_string());
            args.push(message.to_string());
            args
        }
        AgentKind::OpencodeStyle => {
            vec![
                binary,
                "run".to_string(),
                "--session".to_string(),
                session_id.to_string(),
                message.to_string(),
            ]
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn claude_style_contains_escaped_dangerous_input() {
        let msg = r#"run `rm -rf /` and $(whoami)"#;
        let cmd = build_shell_command(msg, "sess-1", AgentKind::ClaudeStyle, &BuildOptions::default());
        assert!(cmd.contains(r"\`rm -rf /\`"));
        assert!(cmd.contains(r"\$(whoami)"));
        assert!(cmd.contains("rm -rf /"));
    }

    #[test]
    fn claude_style_shape() {
        let cmd = build_shell_command("hello", "s1", AgentKind::ClaudeStyle, &BuildOptions::default());
        assert!(cmd.starts_with("claude --dangerously-skip-permissions"));
        assert!(cmd.contains(r#"--session-id "s1""#));
        assert!(cmd.contains(r#"-p "hello""#));
    }

    #[test]
    fn opencode_style_sets_no_color_and_strips_ansi() {
        let cmd = build_shell_command("hi", "s2", AgentKind::OpencodeStyle, &BuildOptions::default());
        assert!(cmd.contains("NO_COLOR=1"));
        assert!(cmd.ends_with(ANSI_STRIP_FILTER));
        assert!(cmd.contains(r#"--session "s2""#));
    }

    #[test]
    fn opencode_style_seeds_config_when_present() {
        let opts = BuildOptions {
            seed_config_json: Some(r#"{"model":"x"}"#.to_string()),
            agent_binary: None,
        };
        let cmd = build_shell_command("hi", "s2", AgentKind::OpencodeStyle, &opts);
        assert!(cmd.contains(".config/opencode/config.json"));
        assert!(cmd.contains(" && NO_COLOR=1 opencode run"));
    }

    #[test]
    fn build_args_preserves_raw_message() {
        let msg = r#"run `rm -rf /` and $(whoami)"#;
        let args = build_args(msg, "sess-1", AgentKind::ClaudeStyle, &BuildOptions::default());
        assert_eq!(args.last().unwrap(), msg);
    }

    #[test]
    fn newlines_are_preserved() {
        let msg = "line one\nline two";
        let cmd = build_shell_command(msg, "s1", AgentKind::ClaudeStyle, &BuildOptions::default());
        assert!(cmd.contains("line one\nline two"));
    }
}
