use anyhow::{anyhow, bail, Result};
use std::env;
use std::path::PathBuf;

/// Command line of the script harness binary.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct HarnessArgs {
    pub fixture: Option<PathBuf>,
    pub golden: Option<PathBuf>,
    pub write_output: Option<PathBuf>,
    pub log: Option<String>,
}

impl HarnessArgs {
    pub fn parse_from_env() -> Result<Self> {
        Self::parse(env::args())
    }

    pub fn parse<I, S>(args: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut parsed = HarnessArgs::default();
        let mut iter = args.into_iter();
        let _ = iter.next(); // skip program name if present
        while let Some(raw_flag) = iter.next() {
            let flag = raw_flag.as_ref();
            let Some(key) = flag.strip_prefix("--") else {
                bail!("Unexpected argument '{flag}'. Use --fixture/--golden/--write-output/--log with values.");
            };
            let value =
                iter.next().ok_or_else(|| anyhow!("Expected a value after '{flag}'"))?.as_ref().to_string();
            match key {
                "fixture" => parsed.fixture = Some(PathBuf::from(value)),
                "golden" => parsed.golden = Some(PathBuf::from(value)),
                "write-output" => parsed.write_output = Some(PathBuf::from(value)),
                "log" => parsed.log = Some(value),
                _ => bail!("Unknown flag '{flag}'. Supported flags: --fixture, --golden, --write-output, --log."),
            }
        }
        Ok(parsed)
    }

    pub fn require_fixture(&self) -> Result<&PathBuf> {
        self.fixture.as_ref().ok_or_else(|| anyhow!("--fixture <path> is required"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_every_flag() {
        let args = ["harness", "--fixture", "a.json", "--golden", "b.json", "--write-output", "c.json", "--log", "debug"];
        let parsed = HarnessArgs::parse(args).expect("parse args");
        assert_eq!(parsed.fixture, Some(PathBuf::from("a.json")));
        assert_eq!(parsed.golden, Some(PathBuf::from("b.json")));
        assert_eq!(parsed.write_output, Some(PathBuf::from("c.json")));
        assert_eq!(parsed.log.as_deref(), Some("debug"));
    }

    #[test]
    fn latest_flag_wins() {
        let parsed = HarnessArgs::parse(["harness", "--fixture", "a.json", "--fixture", "b.json"]).expect("parse args");
        assert_eq!(parsed.require_fixture().unwrap(), &PathBuf::from("b.json"));
    }

    #[test]
    fn missing_value_errors() {
        let err = HarnessArgs::parse(["harness", "--fixture"]).unwrap_err();
        assert!(err.to_string().contains("Expected a value"), "error should mention missing value");
    }

    #[test]
    fn rejects_unknown_flags() {
        let err = HarnessArgs::parse(["harness", "--width", "800"]).unwrap_err();
        assert!(err.to_string().contains("Unknown flag"), "unknown flags should error");
    }

    #[test]
    fn fixture_is_required() {
        let parsed = HarnessArgs::parse(["harness"]).expect("parse args");
        assert!(parsed.require_fixture().is_err());
    }
}
