#![allow(
    clippy::expect_used,
    clippy::unwrap_used,
    clippy::wildcard_imports,
    clippy::indexing_slicing
)]
//! Integration tests for the marble verbs against a real temporary tree.

mod common;

use std::fs;
use std::io;

use common::{FailingFs, MarbleTestContext, ScriptedExecutor};
use realitymarble::error::{MarbleError, Side};
use realitymarble::marble::{Verb, VerbOutcome};

// ---------------------------------------------------------------------------
// collect / drop
// ---------------------------------------------------------------------------

/// `~/.vimrc` is stored as `<marble>/home/vimrc` and linked back; dropping it
/// restores the plain file and leaves nothing in the store.
#[cfg(unix)]
#[test]
fn vimrc_collect_then_drop_round_trip() {
    let ctx = MarbleTestContext::new();
    let marble = ctx.open();
    let content = "set number\nsyntax on\n";
    let vimrc = ctx.home_file(".vimrc", content);

    assert_eq!(marble.collect(&vimrc).unwrap(), VerbOutcome::Applied);
    let stored = ctx.marble.join("home").join("vimrc");
    assert_eq!(fs::read_to_string(&stored).unwrap(), content);
    assert!(fs::symlink_metadata(&vimrc).unwrap().file_type().is_symlink());
    assert_eq!(fs::read_link(&vimrc).unwrap(), stored);

    assert_eq!(marble.drop(&vimrc).unwrap(), VerbOutcome::Applied);
    let meta = fs::symlink_metadata(&vimrc).unwrap();
    assert!(meta.is_file(), "external is a regular file again");
    assert_eq!(fs::read(&vimrc).unwrap(), content.as_bytes());
    assert!(ctx.stored_files().is_empty());
    assert!(!ctx.marble.join("home").exists());
}

/// Identity rules keep every component, dots included.
#[cfg(unix)]
#[test]
fn identity_rule_keeps_relative_layout() {
    let ctx = MarbleTestContext::new();
    let marble = ctx.open();
    let sshd = ctx.etc_file("ssh/sshd_config", "PermitRootLogin no\n");

    marble.collect(&sshd).unwrap();

    assert_eq!(
        ctx.stored_files(),
        vec![ctx.marble.join("etc").join("ssh").join("sshd_config")]
    );
}

/// Only the first component loses its dot under reveal-hidden.
#[cfg(unix)]
#[test]
fn reveal_hidden_keeps_deeper_dots() {
    let ctx = MarbleTestContext::new();
    let marble = ctx.open();
    let file = ctx.home_file(".config/git/.ignore", "*.swp\n");

    marble.collect(&file).unwrap();

    assert_eq!(
        ctx.stored_files(),
        vec![ctx.marble.join("home/config/git/.ignore")]
    );
}

/// A path no rule covers fails before anything is mutated.
#[test]
fn unmatched_path_is_left_alone() {
    let ctx = MarbleTestContext::new();
    let fs_ops = FailingFs::default();
    let marble = ctx.builder().fs_ops(fs_ops.clone()).build();
    let outside = ctx.marble.parent().unwrap().join("notes.txt");
    fs::write(&outside, "hello").unwrap();

    for verb in [Verb::Collect, Verb::Drop, Verb::Project, Verb::Materialize] {
        let err = marble.apply(verb, &outside).unwrap_err();
        assert!(matches!(err, MarbleError::NotManaged { .. }), "{verb}: {err}");
    }
    assert!(fs_ops.performed().is_empty());
    assert!(ctx.stored_files().is_empty());
    assert_eq!(fs::read_to_string(&outside).unwrap(), "hello");
}

/// A failing link step undoes the copy into the store.
#[test]
fn collect_rolls_back_when_link_fails() {
    let ctx = MarbleTestContext::new();
    let fs_ops = FailingFs::default().fail_once("project", io::ErrorKind::Other);
    let marble = ctx.builder().fs_ops(fs_ops).build();
    let bashrc = ctx.home_file(".bashrc", "alias ll='ls -l'\n");

    let err = marble.collect(&bashrc).unwrap_err();

    assert!(
        matches!(
            &err,
            MarbleError::PartialFailure {
                verb: "collect",
                completed: 1,
                source,
            } if matches!(**source, MarbleError::Io { .. })
        ),
        "{err}"
    );
    assert!(ctx.stored_files().is_empty());
    assert!(!ctx.marble.join("home").exists());
    assert!(fs::symlink_metadata(&bashrc).unwrap().is_file());
    assert_eq!(fs::read_to_string(&bashrc).unwrap(), "alias ll='ls -l'\n");
}

/// A failing store removal during drop puts the link back.
#[cfg(unix)]
#[test]
fn drop_rolls_back_when_store_removal_fails() {
    let ctx = MarbleTestContext::new();
    let profile = ctx.home_file(".profile", "export EDITOR=vi\n");
    ctx.open().collect(&profile).unwrap();

    let fs_ops = FailingFs::default().fail_once("unlink", io::ErrorKind::Other);
    let marble = ctx.builder().fs_ops(fs_ops).build();
    let err = marble.drop(&profile).unwrap_err();

    assert!(matches!(err, MarbleError::PartialFailure { completed: 1, .. }));
    let stored = ctx.marble.join("home").join("profile");
    assert_eq!(fs::read_link(&profile).unwrap(), stored);
    assert_eq!(fs::read_to_string(&stored).unwrap(), "export EDITOR=vi\n");
}

#[cfg(unix)]
#[test]
fn collect_rejects_already_collected_link() {
    let ctx = MarbleTestContext::new();
    let marble = ctx.open();
    let zshrc = ctx.home_file(".zshrc", "a");
    marble.collect(&zshrc).unwrap();

    let err = marble.collect(&zshrc).unwrap_err();

    assert!(matches!(err, MarbleError::SymlinkNotCollectable { .. }));
}

// ---------------------------------------------------------------------------
// project / materialize
// ---------------------------------------------------------------------------

/// An identical external file is replaced by a link after `diff -q`.
#[cfg(unix)]
#[test]
fn project_replaces_identical_file() {
    let ctx = MarbleTestContext::new();
    let stored = ctx.stored_file("home/gitconfig", "[core]\n");
    let external = ctx.home_file(".gitconfig", "[core]\n");
    let executor = ScriptedExecutor::with_responses(vec![(true, String::new())]);
    let marble = ctx.builder().executor(executor.clone()).build();

    assert_eq!(marble.project(&external).unwrap(), VerbOutcome::Applied);

    assert_eq!(fs::read_link(&external).unwrap(), stored);
    let calls = executor.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].0, "diff");
    assert_eq!(
        calls[0].1,
        vec![
            "-q".to_string(),
            external.display().to_string(),
            stored.display().to_string(),
        ]
    );
}

/// A differing external file is never overwritten.
#[test]
fn project_refuses_differing_file() {
    let ctx = MarbleTestContext::new();
    ctx.stored_file("home/tmux.conf", "set -g mouse on\n");
    let external = ctx.home_file(".tmux.conf", "set -g mouse off\n");
    let executor = ScriptedExecutor::with_responses(vec![(false, String::new())]);
    let marble = ctx.builder().executor(executor).build();

    let err = marble.project(&external).unwrap_err();

    assert!(matches!(err, MarbleError::MergeConflict { .. }), "{err}");
    assert!(fs::symlink_metadata(&external).unwrap().is_file());
    assert_eq!(fs::read_to_string(&external).unwrap(), "set -g mouse off\n");
}

/// Projecting onto an existing correct link changes nothing and runs no
/// difference tool.
#[cfg(unix)]
#[test]
fn project_is_idempotent() {
    let ctx = MarbleTestContext::new();
    ctx.stored_file("home/inputrc", "set bell-style none\n");
    let external = ctx.home.join(".inputrc");
    let executor = ScriptedExecutor::default();
    let marble = ctx.builder().executor(executor.clone()).build();

    assert_eq!(marble.project(&external).unwrap(), VerbOutcome::Applied);
    assert_eq!(
        marble.project(&external).unwrap(),
        VerbOutcome::AlreadyCorrect
    );
    assert!(executor.calls().is_empty());
}

/// Materialize leaves an independent copy and keeps the store; project can
/// link it again afterwards.
#[cfg(unix)]
#[test]
fn materialize_then_project_again() {
    let ctx = MarbleTestContext::new();
    let external = ctx.home_file(".gemrc", "gem: --no-document\n");
    let executor = ScriptedExecutor::with_responses(vec![(true, String::new())]);
    let marble = ctx.builder().executor(executor).build();
    marble.collect(&external).unwrap();

    assert_eq!(marble.materialize(&external).unwrap(), VerbOutcome::Applied);
    assert!(fs::symlink_metadata(&external).unwrap().is_file());
    assert_eq!(
        ctx.stored_files(),
        vec![ctx.marble.join("home").join("gemrc")]
    );

    assert_eq!(marble.project(&external).unwrap(), VerbOutcome::Applied);
    assert!(fs::symlink_metadata(&external).unwrap().file_type().is_symlink());
}

// ---------------------------------------------------------------------------
// touch
// ---------------------------------------------------------------------------

/// Touch creates the store file, opens the editor on it and links it.
#[cfg(unix)]
#[test]
fn touch_runs_editor_on_store_file() {
    let ctx = MarbleTestContext::new();
    let executor = ScriptedExecutor::with_responses(vec![(true, String::new())]);
    let marble = ctx.builder().executor(executor.clone()).build();
    fs::create_dir_all(ctx.home.join(".config")).unwrap();
    let external = ctx.home.join(".config/starship.toml");

    assert_eq!(marble.touch(&external).unwrap(), VerbOutcome::Applied);

    let stored = ctx.marble.join("home/config/starship.toml");
    assert!(stored.is_file());
    assert_eq!(fs::read_link(&external).unwrap(), stored);
    assert_eq!(
        executor.calls(),
        vec![(
            "fake-editor".to_string(),
            vec![stored.display().to_string()]
        )]
    );
}

/// A failing editor removes the new store file and its directories.
#[test]
fn touch_rolls_back_on_editor_failure() {
    let ctx = MarbleTestContext::new();
    let executor = ScriptedExecutor::with_responses(vec![(false, String::new())]);
    let marble = ctx.builder().executor(executor).build();
    fs::create_dir_all(ctx.home.join(".config")).unwrap();
    let external = ctx.home.join(".config/starship.toml");

    let err = marble.touch(&external).unwrap_err();

    assert!(matches!(err, MarbleError::PartialFailure { completed: 1, .. }));
    assert!(ctx.stored_files().is_empty());
    assert!(!ctx.marble.join("home").exists());
    assert!(!external.exists());
}

#[test]
fn touch_refuses_existing_store_file() {
    let ctx = MarbleTestContext::new();
    ctx.stored_file("home/newrc", "");
    let marble = ctx.open();

    let err = marble.touch(&ctx.home.join(".newrc")).unwrap_err();

    assert!(matches!(
        err,
        MarbleError::AlreadyExists {
            side: Side::Internal,
            ..
        }
    ));
}
