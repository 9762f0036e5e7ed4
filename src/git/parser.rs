use crate::error::GitResult;

/// Parse git status --porcelain=v2 output
pub fn parse_status_porcelain_v2(output: &str) -> GitResult<Vec<StatusEntry>> {
    let mut entries = Vec::new();

    for line in output.lines() {
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let parts: Vec<&str> = line.split(' ').collect();
        if parts.is_empty() {
            continue;
        }

        match parts[0] {
            "1" | "2" => {
                // Ordinary: 1 <XY> <sub> <mH> <mI> <mW> <hH> <hI> <path>
                // Renamed:  2 <XY> <sub> <mH> <mI> <mW> <hH> <hI> <X><score> <path>\t<origPath>
                let path_start = if parts[0] == "1" { 8 } else { 9 };
                if parts.len() > path_start {
                    let xy = parts[1];
                    let joined = parts[path_start..].join(" ");
                    let path = joined.split('\t').next().unwrap_or_default().to_string();

                    let status = if parts[0] == "2" {
                        FileStatus::Renamed
                    } else {
                        match xy {
                            "M." | ".M" | "MM" => FileStatus::Modified,
                            "A." | ".A" | "AM" => FileStatus::Added,
                            "D." | ".D" => FileStatus::Deleted,
                            "T." | ".T" => FileStatus::TypeChanged,
                            _ => FileStatus::Unknown,
                        }
                    };

                    let staged = !xy.starts_with('.');
                    let unstaged = xy.chars().nth(1).is_some_and(|c| c != '.');

                    entries.push(StatusEntry {
                        status,
                        path,
                        staged,
                        unstaged,
                    });
                }
            }
            "u" => {
                // Unmerged: u <XY> <sub> <m1> <m2> <m3> <mW> <h1> <h2> <h3> <path>
                if parts.len() > 10 {
                    entries.push(StatusEntry {
                        status: FileStatus::Conflicted,
                        path: parts[10..].join(" "),
                        staged: true,
                        unstaged: true,
                    });
                }
            }
            "?" => {
                // Untracked file: ? <path>
                if parts.len() >= 2 {
                    let path = parts[1..].join(" ");
                    entries.push(StatusEntry {
                        status: FileStatus::Untracked,
                        path,
                        staged: false,
                        unstaged: false,
                    });
                }
            }
            _ => {}
        }
    }

    Ok(entries)
}

/// Parse git for-each-ref output with format %(refname)%00%(objectname)
pub fn parse_ref_list(output: &str) -> GitResult<Vec<RefEntry>> {
    let mut refs = Vec::new();

    for line in output.lines() {
        if line.is_empty() {
            continue;
        }

        let parts: Vec<&str> = line.split('\0').collect();
        if parts.len() >= 2 && !parts[0].is_empty() {
            refs.push(RefEntry {
                name: parts[0].to_string(),
                target: parts[1].trim().to_string(),
            });
        }
    }

    Ok(refs)
}

/// Represents a file status entry from git status
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusEntry {
    pub status: FileStatus,
    pub path: String,
    pub staged: bool,
    pub unstaged: bool,
}

/// File status types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileStatus {
    Modified,
    Added,
    Deleted,
    Renamed,
    TypeChanged,
    Conflicted,
    Untracked,
    Unknown,
}

/// A ref and the object it points at
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefEntry {
    pub name: String,
    pub target: String,
}
