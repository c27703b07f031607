use super::*;

#[test]
fn parses_host_commands() {
    assert_eq!(parse_command("vote 5").unwrap(), Some(HostCommand::Vote(5)));
    assert_eq!(parse_command("  START ").unwrap(), Some(HostCommand::Start));
    assert_eq!(parse_command("skip").unwrap(), Some(HostCommand::Skip));
    assert_eq!(parse_command("estimate 13").unwrap(), Some(HostCommand::Estimate(13)));
    assert_eq!(parse_command("init").unwrap(), Some(HostCommand::Init));
    assert_eq!(parse_command("exit").unwrap(), Some(HostCommand::Quit));
    assert_eq!(parse_command("   ").unwrap(), None);
}

#[test]
fn rejects_bad_commands() {
    assert!(matches!(parse_command("dance"), Err(CliError::UnknownCommand(verb)) if verb == "dance"));
    assert!(matches!(parse_command("vote"), Err(CliError::InvalidEstimate { command: "vote", .. })));
    assert!(matches!(parse_command("estimate x"), Err(CliError::InvalidEstimate { value, .. }) if value == "x"));
}

#[test]
fn parses_session_flags() {
    let cli = Cli::try_parse_from([
        "poker-cli",
        "--token",
        "t",
        "--user-id",
        "1",
        "--session-id",
        "7",
        "--coordinator-id",
        "1",
        "--deck",
        "even",
        "--scale",
        "1,2,3",
    ])
    .unwrap();
    assert_eq!(cli.deck, DeckKind::Even);
    assert_eq!(cli.scale, vec![1, 2, 3]);
    assert_eq!(cli.duration_secs, 60);
}
