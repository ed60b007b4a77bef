//! Parsing of SMTP command lines

use crate::smtp::error::{SmtpError, SmtpLimits};

/// A parsed SMTP command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Helo(String),
    Ehlo(String),
    Noop,
    /// `MAIL FROM:<path>`; the null reverse-path `<>` yields an empty string
    MailFrom(String),
    RcptTo(String),
    Data,
    Rset,
    Vrfy(String),
    Quit,
}

impl Command {
    /// The command verb as it appears on the wire
    pub fn verb(&self) -> &'static str {
        match self {
            Command::Helo(_) => "HELO",
            Command::Ehlo(_) => "EHLO",
            Command::Noop => "NOOP",
            Command::MailFrom(_) => "MAIL",
            Command::RcptTo(_) => "RCPT",
            Command::Data => "DATA",
            Command::Rset => "RSET",
            Command::Vrfy(_) => "VRFY",
            Command::Quit => "QUIT",
        }
    }
}

/// Parse a single command line, with or without its trailing CRLF
pub fn parse_command(line: &str) -> Result<Command, SmtpError> {
    if line.len() > SmtpLimits::COMMAND_LINE_MAX_LENGTH {
        return Err(SmtpError::LineTooLong {
            max: SmtpLimits::COMMAND_LINE_MAX_LENGTH,
        });
    }

    let line = line.trim();
    let (verb, args) = match line.split_once(char::is_whitespace) {
        Some((verb, args)) => (verb, args.trim()),
        None => (line, ""),
    };

    match verb.to_uppercase().as_str() {
        "HELO" => Ok(Command::Helo(required_arg("HELO", args)?)),
        "EHLO" => Ok(Command::Ehlo(required_arg("EHLO", args)?)),
        "NOOP" => Ok(Command::Noop),
        "MAIL" => parse_path(args, "FROM:").map(Command::MailFrom),
        "RCPT" => {
            let path = parse_path(args, "TO:")?;
            if path.is_empty() {
                return Err(SmtpError::InvalidSyntax(
                    "TO address cannot be empty".to_string(),
                ));
            }
            Ok(Command::RcptTo(path))
        }
        "DATA" => no_args("DATA", args).map(|_| Command::Data),
        "RSET" => no_args("RSET", args).map(|_| Command::Rset),
        "VRFY" => Ok(Command::Vrfy(required_arg("VRFY", args)?)),
        "QUIT" => no_args("QUIT", args).map(|_| Command::Quit),
        _ => Err(SmtpError::InvalidCommand),
    }
}

fn required_arg(verb: &str, args: &str) -> Result<String, SmtpError> {
    if args.is_empty() {
        return Err(SmtpError::InvalidSyntax(format!(
            "{verb} requires an argument"
        )));
    }
    Ok(args.to_string())
}

fn no_args(verb: &str, args: &str) -> Result<(), SmtpError> {
    if !args.is_empty() {
        return Err(SmtpError::InvalidSyntax(format!(
            "{verb} command takes no arguments"
        )));
    }
    Ok(())
}

/// Extract the address from `FROM:<addr>` / `TO:<addr>`, ignoring any
/// trailing ESMTP parameters
fn parse_path(args: &str, keyword: &str) -> Result<String, SmtpError> {
    let prefix = args.get(..keyword.len()).unwrap_or_default();
    if !prefix.eq_ignore_ascii_case(keyword) {
        return Err(SmtpError::InvalidSyntax(format!(
            "expected '{keyword}<address>'"
        )));
    }

    let rest = args[keyword.len()..].trim_start();
    let path = rest
        .strip_prefix('<')
        .and_then(|rest| rest.split_once('>'))
        .map(|(path, _params)| path)
        .ok_or_else(|| {
            SmtpError::InvalidSyntax("address must be enclosed in angle brackets".to_string())
        })?;

    if path.len() > SmtpLimits::PATH_MAX_LENGTH {
        return Err(SmtpError::PathTooLong {
            max: SmtpLimits::PATH_MAX_LENGTH,
        });
    }

    Ok(path.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_helo_command() {
        assert_eq!(
            parse_command("HELO client.local\r\n").unwrap(),
            Command::Helo("client.local".to_string())
        );
        assert_eq!(
            parse_command("ehlo client.local").unwrap(),
            Command::Ehlo("client.local".to_string())
        );
    }

    #[test]
    fn test_helo_missing_domain() {
        let result = parse_command("HELO\r\n");
        assert!(matches!(result, Err(SmtpError::InvalidSyntax(_))));
    }

    #[test]
    fn test_mail_command() {
        assert_eq!(
            parse_command("MAIL FROM:<sender@example.com>\r\n").unwrap(),
            Command::MailFrom("sender@example.com".to_string())
        );
        assert_eq!(
            parse_command("mail from: <sender@example.com> BODY=8BITMIME").unwrap(),
            Command::MailFrom("sender@example.com".to_string())
        );
    }

    #[test]
    fn test_mail_null_sender() {
        assert_eq!(
            parse_command("MAIL FROM:<>").unwrap(),
            Command::MailFrom(String::new())
        );
    }

    #[test]
    fn test_mail_invalid_syntax() {
        assert!(matches!(
            parse_command("MAIL sender@example.com"),
            Err(SmtpError::InvalidSyntax(_))
        ));
        assert!(matches!(
            parse_command("MAIL FROM:sender@example.com"),
            Err(SmtpError::InvalidSyntax(_))
        ));
        assert!(matches!(
            parse_command("MAIL"),
            Err(SmtpError::InvalidSyntax(_))
        ));
    }

    #[test]
    fn test_rcpt_command() {
        assert_eq!(
            parse_command("RCPT TO:<recipient@example.com>\r\n").unwrap(),
            Command::RcptTo("recipient@example.com".to_string())
        );
    }

    #[test]
    fn test_rcpt_empty_address() {
        assert!(matches!(
            parse_command("RCPT TO:<>"),
            Err(SmtpError::InvalidSyntax(_))
        ));
    }

    #[test]
    fn test_path_too_long() {
        let line = format!("RCPT TO:<{}@example.com>", "a".repeat(SmtpLimits::PATH_MAX_LENGTH));
        assert!(matches!(
            parse_command(&line),
            Err(SmtpError::PathTooLong { .. })
        ));
    }

    #[test]
    fn test_commands_without_arguments() {
        assert_eq!(parse_command("DATA\r\n").unwrap(), Command::Data);
        assert_eq!(parse_command("RSET").unwrap(), Command::Rset);
        assert_eq!(parse_command("NOOP").unwrap(), Command::Noop);
        assert_eq!(parse_command("quit").unwrap(), Command::Quit);
        assert!(matches!(
            parse_command("DATA now"),
            Err(SmtpError::InvalidSyntax(_))
        ));
    }

    #[test]
    fn test_vrfy_command() {
        assert_eq!(
            parse_command("VRFY test").unwrap(),
            Command::Vrfy("test".to_string())
        );
        assert!(parse_command("VRFY").is_err());
    }

    #[test]
    fn test_unknown_command() {
        assert!(matches!(
            parse_command("EXPN list"),
            Err(SmtpError::InvalidCommand)
        ));
        assert!(matches!(parse_command(""), Err(SmtpError::InvalidCommand)));
    }

    #[test]
    fn test_command_line_too_long() {
        let line = format!("HELO {}", "a".repeat(SmtpLimits::COMMAND_LINE_MAX_LENGTH));
        assert!(matches!(
            parse_command(&line),
            Err(SmtpError::LineTooLong { .. })
        ));
    }

    #[test]
    fn test_verb() {
        assert_eq!(Command::MailFrom(String::new()).verb(), "MAIL");
        assert_eq!(Command::Vrfy("x".to_string()).verb(), "VRFY");
    }
}
