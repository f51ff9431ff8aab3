//! Translation of file/command requests into in-container argv.
//!
//! Pure functions only; the [`Sandbox`](super::Sandbox) facade feeds the
//! result to a single exec call.

use std::path::Path;

/// Build the argv that runs `path` inside the container, chosen by extension.
///
/// Every path maps to a command: unknown extensions are made executable
/// and run directly.
pub fn execute_file_command(path: &str, args: &[String], session_id: &str) -> Vec<String> {
    let extension = Path::new(path).extension().and_then(|e| e.to_str());

    let interpreter = match extension {
        Some("sh") => Some("sh"),
        Some("py") => Some("python"),
        Some("js") => Some("node"),
        _ => None,
    };

    if let Some(interpreter) = interpreter {
        let mut argv = vec![interpreter.to_string(), path.to_string()];
        argv.extend(args.iter().cloned());
        return argv;
    }

    let (prepare, binary) = if extension == Some("c") {
        let output = compiled_binary_path(path, session_id);
        (
            vec!["cc".to_string(), path.to_string(), "-o".to_string(), output.clone()],
            output,
        )
    } else {
        (
            vec!["chmod".to_string(), "+x".to_string(), path.to_string()],
            path.to_string(),
        )
    };

    let mut run = vec![binary];
    run.extend(args.iter().cloned());

    let script = format!(
        "{} && {}",
        shell_words::join(&prepare),
        shell_words::join(&run)
    );
    shell(script)
}

/// Session-scoped temp path for a compiled C program.
fn compiled_binary_path(path: &str, session_id: &str) -> String {
    let stem = Path::new(path)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("a");
    format!("/tmp/{stem}-{session_id}.out")
}

/// Build a heredoc script that writes `content` to `path` byte-for-byte.
///
/// A heredoc body always ends with a newline. When `content` has none, the
/// body is routed through command substitution, which strips exactly that
/// one trailing newline.
pub fn write_file_command(path: &str, content: &str) -> Vec<String> {
    let delimiter = heredoc_delimiter(content);
    let target = shell_words::quote(path);

    let script = if content.ends_with('\n') {
        format!("cat > {target} <<'{delimiter}'\n{content}{delimiter}\n")
    } else {
        format!("printf '%s' \"$(cat <<'{delimiter}'\n{content}\n{delimiter}\n)\" > {target}")
    };
    shell(script)
}

/// Pick a heredoc terminator that does not appear as a line of `content`.
fn heredoc_delimiter(content: &str) -> String {
    loop {
        let candidate = format!("SANDPOOL_EOF_{}", uuid::Uuid::new_v4().simple());
        if !content.lines().any(|line| line == candidate) {
            return candidate;
        }
    }
}

/// `cat` the file at `path`.
pub fn read_file_command(path: &str) -> Vec<String> {
    shell(format!("cat {}", shell_words::quote(path)))
}

/// Wrap a shell statement for execution with `sh -c`.
pub fn shell(script: impl Into<String>) -> Vec<String> {
    vec!["sh".to_string(), "-c".to_string(), script.into()]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(parts: &[&str]) -> Vec<String> {
        parts.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn test_python_file() {
        assert_eq!(
            execute_file_command("run.py", &args(&["--x"]), "s1"),
            args(&["python", "run.py", "--x"])
        );
    }

    #[test]
    fn test_shell_and_node_files() {
        assert_eq!(
            execute_file_command("build.sh", &[], "s1"),
            args(&["sh", "build.sh"])
        );
        assert_eq!(
            execute_file_command("/app/index.js", &args(&["a", "b"]), "s1"),
            args(&["node", "/app/index.js", "a", "b"])
        );
    }

    #[test]
    fn test_c_file_compiles_then_runs() {
        let argv = execute_file_command("prog.c", &[], "s1");
        assert_eq!(
            argv,
            shell("cc prog.c -o /tmp/prog-s1.out && /tmp/prog-s1.out")
        );
    }

    #[test]
    fn test_c_file_passes_args_to_binary() {
        let argv = execute_file_command("src/main.c", &args(&["hello world"]), "abc");
        assert_eq!(
            argv[2],
            "cc src/main.c -o /tmp/main-abc.out && /tmp/main-abc.out 'hello world'"
        );
    }

    #[test]
    fn test_unknown_extension_is_made_executable() {
        assert_eq!(
            execute_file_command("noext", &[], "s1"),
            shell("chmod +x noext && noext")
        );
        assert_eq!(
            execute_file_command("tool.rb", &args(&["-v"]), "s1"),
            shell("chmod +x tool.rb && tool.rb -v")
        );
    }

    #[test]
    fn test_uppercase_extension_falls_back() {
        assert_eq!(
            execute_file_command("RUN.PY", &[], "s1"),
            shell("chmod +x RUN.PY && RUN.PY")
        );
    }

    #[test]
    fn test_write_file_with_trailing_newline_uses_plain_heredoc() {
        let argv = write_file_command("out.txt", "line one\nline two\n");
        let script = &argv[2];
        assert!(script.starts_with("cat > out.txt <<'SANDPOOL_EOF_"));
        assert!(script.contains("\nline one\nline two\nSANDPOOL_EOF_"));
    }

    #[test]
    fn test_write_file_without_trailing_newline_strips_one() {
        let argv = write_file_command("out.txt", "no newline");
        let script = &argv[2];
        assert!(script.starts_with("printf '%s' \"$(cat <<'SANDPOOL_EOF_"));
        assert!(script.ends_with(")\" > out.txt"));
        assert!(script.contains("\nno newline\nSANDPOOL_EOF_"));
    }

    #[test]
    fn test_write_file_quotes_path() {
        let argv = write_file_command("my dir/$file;rm.txt", "x\n");
        assert!(argv[2].starts_with("cat > 'my dir/$file;rm.txt' <<"));
    }

    #[test]
    fn test_write_file_content_containing_eof_is_preserved() {
        let content = "EOF\n'quoted' $VAR `tick`\nEOF\n";
        let argv = write_file_command("f", content);
        assert!(argv[2].contains(content));
    }

    #[test]
    fn test_read_file_quotes_path() {
        assert_eq!(read_file_command("a b.txt"), shell("cat 'a b.txt'"));
    }
}
