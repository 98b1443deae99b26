//! Fake helpers for tests: small `sh` scripts speaking the line protocol over
//! the two descriptors passed as their last arguments.
//!
//! The descriptors are reached through `/dev/fd/N`, since `dash` refuses
//! `<&N` / `>&N` for N above 9 and the passed numbers usually are.

use std::path::PathBuf;

use tempfile::TempDir;

use crate::config::HelperCommand;

/// Binds `$req`/`$resp` to the last two arguments.
const PREAMBLE: &str = r#"
eval "req=\${$(($# - 1))}"
eval "resp=\${$#}"
"#;

/// Orders compared versions lexically; answers queries with `nil 1.0 nil`,
/// or an empty line for provides `missing`.
pub const ECHO_HELPER: &str = r#"
while IFS= read -r line < "/dev/fd/$req"; do
  case "$line" in
    *'"action":"versioncompare"'*)
      v=${line#*\"versions\":\[\"}
      a=${v%%\"*}
      rest=${v#*\",\"}
      b=${rest%%\"*}
      if [ "$a" = "$b" ]; then
        r=0
      elif [ "$(printf '%s\n%s\n' "$a" "$b" | LC_ALL=C sort | head -n 1)" = "$a" ]; then
        r=-1
      else
        r=1
      fi
      printf '%s\n' "$r" > "/dev/fd/$resp"
      ;;
    *'"action":"flushcache"'*)
      ;;
    *'"provides":"missing"'*)
      printf '\n' > "/dev/fd/$resp"
      ;;
    *)
      printf '%s\n' "nil 1.0 nil" > "/dev/fd/$resp"
      ;;
  esac
done
"#;

/// Chatters on its own stdout/stderr around every reply.
pub const NOISY_HELPER: &str = r#"
while IFS= read -r line < "/dev/fd/$req"; do
  printf 'noise on stderr\n' >&2
  printf 'noise on stdout\n'
  printf '0\n' > "/dev/fd/$resp"
done
"#;

/// Reports `$EVRBRIDGE_TEST_FLAG` as the version of every query.
pub const ENV_HELPER: &str = r#"
while IFS= read -r line < "/dev/fd/$req"; do
  printf 'nil %s nil\n' "$EVRBRIDGE_TEST_FLAG" > "/dev/fd/$resp"
done
"#;

/// Reads requests and never answers.
pub const HANG_HELPER: &str = r#"
while IFS= read -r line < "/dev/fd/$req"; do
  :
done
"#;

/// Answers everything with a line no request expects.
pub const GARBAGE_HELPER: &str = r#"
while IFS= read -r line < "/dev/fd/$req"; do
  printf 'TEST garbage\n' > "/dev/fd/$resp"
done
"#;

/// Emits each reply in two writes with a pause in between.
pub const SPLIT_HELPER: &str = r#"
while IFS= read -r line < "/dev/fd/$req"; do
  printf 'nil 1.' > "/dev/fd/$resp"
  sleep 0.1
  printf '0 nil\n' > "/dev/fd/$resp"
done
"#;

/// Answers every request with two lines in a single write.
pub const DOUBLE_REPLY_HELPER: &str = r#"
while IFS= read -r line < "/dev/fd/$req"; do
  printf '0\n7\n' > "/dev/fd/$resp"
done
"#;

/// Answers every request, then sends a second unrequested line a moment later.
pub const LATE_EXTRA_HELPER: &str = r#"
while IFS= read -r line < "/dev/fd/$req"; do
  printf '0\n' > "/dev/fd/$resp"
  sleep 0.1
  printf '7\n' > "/dev/fd/$resp"
done
"#;

/// Records each start in `$1`; dies with a message on stderr for the first
/// `$2` starts, then answers every request with `-1`.
pub const FLAKY_HELPER: &str = r#"
printf 'start\n' >> "$1"
starts=$(wc -l < "$1")
if [ "$starts" -le "$2" ]; then
  printf 'boom %s\n' "$starts" >&2
  exit 1
fi
while IFS= read -r line < "/dev/fd/$req"; do
  printf '%s\n' "-1" > "/dev/fd/$resp"
done
"#;

pub struct HelperScript {
    dir: TempDir,
    path: PathBuf,
    args: Vec<String>,
}

impl HelperScript {
    pub fn new(body: &str) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("helper.sh");
        std::fs::write(&path, format!("#!/bin/sh\n{PREAMBLE}{body}")).unwrap();
        Self {
            dir,
            path,
            args: Vec::new(),
        }
    }

    /// A [`FLAKY_HELPER`] failing its first `failures` starts.
    pub fn flaky(failures: u32) -> Self {
        let mut script = Self::new(FLAKY_HELPER);
        let count_file = script.count_file();
        script.args = vec![count_file.display().to_string(), failures.to_string()];
        script
    }

    pub fn count_file(&self) -> PathBuf {
        self.dir.path().join("starts")
    }

    /// Starts recorded by a [`FLAKY_HELPER`].
    pub fn starts(&self) -> usize {
        std::fs::read_to_string(self.count_file())
            .map(|s| s.lines().count())
            .unwrap_or(0)
    }

    pub fn command(&self) -> HelperCommand {
        self.args
            .iter()
            .fold(HelperCommand::new("/bin/sh").arg(&self.path), |cmd, arg| {
                cmd.arg(arg)
            })
    }
}
