mod helpers;

use gitguard::git::{FileStatus, InProgressOperation};
use gitguard::{GitError, GitVersion, Repository};
use helpers::{create_commit, create_test_repo, git, head};
use std::fs;
use tempfile::TempDir;

#[test]
fn test_git_version_detection() {
    let version = GitVersion::detect().expect("Failed to detect git version");
    assert!(version.major >= 2);
}

#[test]
fn test_git_version_validation() {
    let version = GitVersion::validate().expect("Git version should be >= 2.20");
    assert!(version.is_supported());
}

#[test]
fn test_discover_repository() {
    let (_temp, repo_path) = create_test_repo();

    let repo = Repository::discover_from(&repo_path).expect("Failed to discover repository");
    assert_eq!(repo.path(), repo_path.as_path());
}

#[test]
fn test_discover_from_subdirectory() {
    let (_temp, repo_path) = create_test_repo();

    let sub_dir = repo_path.join("subdir").join("deeper");
    fs::create_dir_all(&sub_dir).expect("Failed to create subdirectory");

    let repo = Repository::discover_from(&sub_dir).expect("Failed to discover from subdirectory");
    assert_eq!(repo.path(), repo_path.as_path());
}

#[test]
fn test_discover_not_a_repository() {
    let temp_dir = TempDir::new().unwrap();
    let result = Repository::discover_from(temp_dir.path());

    assert!(matches!(result, Err(GitError::NotARepository)));
}

#[test]
fn test_queries_outside_repository_fail() {
    let temp_dir = TempDir::new().unwrap();
    let repo = Repository::new(temp_dir.path());

    assert!(repo.current_ref().is_err());
    assert!(matches!(repo.status(), Err(GitError::NotARepository)));
}

#[test]
fn test_git_dir_resolution() {
    let (_temp, repo_path) = create_test_repo();
    let repo = Repository::new(&repo_path);

    let git_dir = repo.git_dir().unwrap();
    assert!(git_dir.is_absolute());
    assert!(git_dir.ends_with(".git"));
}

#[test]
fn test_unborn_head() {
    let (_temp, repo_path) = create_test_repo();
    let repo = Repository::new(&repo_path);

    let head_ref = repo.current_ref().unwrap();
    assert_eq!(head_ref.branch.as_deref(), Some("main"));
    assert!(head_ref.is_unborn());
    assert!(!head_ref.is_detached());
    assert!(!repo.is_working_tree_dirty().unwrap());
}

#[test]
fn test_attached_head() {
    let (_temp, repo_path) = create_test_repo();
    create_commit(&repo_path, "file.txt", "content", "Initial commit");
    let repo = Repository::new(&repo_path);

    let head_ref = repo.current_ref().unwrap();
    assert_eq!(head_ref.branch.as_deref(), Some("main"));
    assert_eq!(head_ref.commit, Some(head(&repo_path)));
}

#[test]
fn test_detached_head_state() {
    let (_temp, repo_path) = create_test_repo();
    create_commit(&repo_path, "file1.txt", "content1", "First commit");
    let first = head(&repo_path);
    create_commit(&repo_path, "file2.txt", "content2", "Second commit");

    git(&repo_path, &["checkout", "--quiet", "--detach", &first]);

    let head_ref = Repository::new(&repo_path).current_ref().unwrap();
    assert!(head_ref.is_detached());
    assert_eq!(head_ref.commit, Some(first));
}

#[test]
fn test_dirty_detection() {
    let (_temp, repo_path) = create_test_repo();
    create_commit(&repo_path, "file.txt", "original", "Initial commit");
    let repo = Repository::new(&repo_path);

    assert!(!repo.is_working_tree_dirty().unwrap());

    fs::write(repo_path.join("untracked.txt"), "new").unwrap();
    assert!(repo.is_working_tree_dirty().unwrap());
    fs::remove_file(repo_path.join("untracked.txt")).unwrap();

    fs::write(repo_path.join("file.txt"), "modified").unwrap();
    assert!(repo.is_working_tree_dirty().unwrap());
}

#[test]
fn test_status_entries() {
    let (_temp, repo_path) = create_test_repo();
    create_commit(&repo_path, "file.txt", "original", "Initial commit");

    fs::write(repo_path.join("file.txt"), "modified").unwrap();
    fs::write(repo_path.join("staged.txt"), "staged").unwrap();
    git(&repo_path, &["add", "staged.txt"]);
    fs::create_dir(repo_path.join("dir")).unwrap();
    fs::write(repo_path.join("dir").join("untracked.txt"), "new").unwrap();

    let entries = Repository::new(&repo_path).status().unwrap();
    let find = |path: &str| entries.iter().find(|e| e.path == path).unwrap();

    assert_eq!(entries.len(), 3);
    assert_eq!(find("file.txt").status, FileStatus::Modified);
    assert!(find("file.txt").unstaged);
    assert_eq!(find("staged.txt").status, FileStatus::Added);
    assert!(find("staged.txt").staged);
    // Untracked files are listed individually, not as their directory
    assert_eq!(find("dir/untracked.txt").status, FileStatus::Untracked);
}

#[test]
fn test_ref_exists() {
    let (_temp, repo_path) = create_test_repo();
    create_commit(&repo_path, "file.txt", "content", "Initial commit");
    let repo = Repository::new(&repo_path);

    assert!(repo.ref_exists("refs/heads/main").unwrap());
    assert!(!repo.ref_exists("refs/heads/nope").unwrap());
    assert!(repo.commit_exists(&head(&repo_path)).unwrap());
    assert!(!repo.commit_exists(&"0".repeat(40)).unwrap());
}

#[test]
fn test_merge_in_progress_detection() {
    let (_temp, repo_path) = create_test_repo();
    create_commit(&repo_path, "file.txt", "base\n", "Base");
    git(&repo_path, &["checkout", "--quiet", "-b", "feature"]);
    create_commit(&repo_path, "file.txt", "feature\n", "Feature change");
    git(&repo_path, &["checkout", "--quiet", "main"]);
    create_commit(&repo_path, "file.txt", "main\n", "Main change");

    let repo = Repository::new(&repo_path);
    assert_eq!(repo.in_progress_operation().unwrap(), None);

    let merge = std::process::Command::new("git")
        .args(["merge", "feature"])
        .current_dir(&repo_path)
        .output()
        .unwrap();
    assert!(!merge.status.success(), "merge should conflict");

    assert_eq!(repo.in_progress_operation().unwrap(), Some(InProgressOperation::Merge));
    let entries = repo.status().unwrap();
    assert!(entries.iter().any(|e| e.status == FileStatus::Conflicted));
}
