//! Maps a submission onto an ordered stage plan.

use crate::attack::{AttackMode, CrackParams, InputFileType};
use crate::config::CrackConfig;
use crate::error::BuildError;
use crate::stage::{StagePlan, StageSpec};
use std::path::Path;

pub const EXTRACT_STAGE: &str = "extract";
pub const CRACK_STAGE: &str = "crack";

/// Build the stage plan for a submission.
///
/// Raw files get a single crack stage. Archives get an extraction stage whose
/// stdout becomes the hash artifact, followed by a crack stage reading it.
pub fn build_plan(
    config: &CrackConfig,
    file_type: InputFileType,
    mode: AttackMode,
    params: &CrackParams,
) -> Result<StagePlan, BuildError> {
    if params.target.as_os_str().is_empty() {
        return Err(BuildError::EmptyTarget);
    }

    let stages = match file_type {
        InputFileType::Raw => {
            let mode_arg = mode_argument(mode, params, None)?;
            vec![crack_stage(config, mode_arg, params, path_arg("target", &params.target)?)]
        }
        InputFileType::Archive(format) => {
            let mode_arg = mode_argument(mode, params, Some(&config.default_wordlist))?;
            let artifact = config.hash_artifact();
            let extractor = config.extractor_for(format.name());

            let extract = StageSpec::new(EXTRACT_STAGE, path_arg("extractor", &extractor)?)
                .arg(path_arg("target", &params.target)?)
                .produces(&artifact);
            let crack = crack_stage(config, mode_arg, params, path_arg("artifact", &artifact)?)
                .consumes(&artifact);

            vec![extract, crack]
        }
    };

    StagePlan::new(stages)
}

/// Parse textual form values, then build the plan.
pub fn build_plan_from_strs(
    config: &CrackConfig,
    file_type: &str,
    mode: &str,
    params: &CrackParams,
) -> Result<StagePlan, BuildError> {
    build_plan(config, file_type.parse()?, mode.parse()?, params)
}

fn crack_stage(
    config: &CrackConfig,
    mode_arg: String,
    params: &CrackParams,
    target: String,
) -> StageSpec {
    let mut stage = StageSpec::new(CRACK_STAGE, config.john_bin.as_str()).arg(mode_arg);
    if let Some(hint) = params.hash_hint.as_deref().map(str::trim) {
        if !hint.is_empty() {
            stage = stage.arg(format!("--format={hint}"));
        }
    }
    stage.arg(target)
}

fn mode_argument(
    mode: AttackMode,
    params: &CrackParams,
    fallback_wordlist: Option<&Path>,
) -> Result<String, BuildError> {
    match mode {
        AttackMode::Dictionary => {
            let wordlist = params
                .wordlist
                .as_deref()
                .filter(|path| !path.as_os_str().is_empty())
                .or(fallback_wordlist)
                .ok_or(BuildError::MissingParameter {
                    mode: "dictionary",
                    parameter: "wordlist",
                })?;
            Ok(format!("--wordlist={}", path_arg("wordlist", wordlist)?))
        }
        AttackMode::Incremental => {
            let order = params.increment_order.ok_or(BuildError::MissingParameter {
                mode: "incremental",
                parameter: "increment order",
            })?;
            Ok(format!("-incremental:{order}"))
        }
        AttackMode::Single => Ok("--single".to_string()),
    }
}

fn path_arg(role: &'static str, path: &Path) -> Result<String, BuildError> {
    path.to_str()
        .map(str::to_string)
        .ok_or_else(|| BuildError::NonUtf8Path {
            role,
            path: path.to_path_buf(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attack::{ArchiveFormat, IncrementOrder};
    use std::path::PathBuf;

    fn config() -> CrackConfig {
        CrackConfig::default().with_artifact_dir("/tmp")
    }

    fn archives() -> [InputFileType; 2] {
        [
            InputFileType::Archive(ArchiveFormat::Zip),
            InputFileType::Archive(ArchiveFormat::Rar),
        ]
    }

    fn full_params() -> CrackParams {
        CrackParams::new("/data/target")
            .with_wordlist("/tmp/w.lst")
            .with_increment_order(IncrementOrder::Alpha)
    }

    #[test]
    fn test_raw_dictionary_scenario() {
        let params = CrackParams::new("/data/shadow").with_wordlist("/tmp/w.lst");
        let plan = build_plan(&config(), InputFileType::Raw, AttackMode::Dictionary, &params)
            .expect("plan");

        assert_eq!(plan.len(), 1);
        let stage = &plan.stages()[0];
        assert_eq!(stage.program, "john");
        assert_eq!(stage.args, vec!["--wordlist=/tmp/w.lst", "/data/shadow"]);
        assert!(stage.output_artifact.is_none());
        assert!(stage.input_artifact.is_none());
    }

    #[test]
    fn test_raw_single_stage_for_every_mode() {
        let expected = [
            (AttackMode::Dictionary, "--wordlist=/tmp/w.lst"),
            (AttackMode::Incremental, "-incremental:Alpha"),
            (AttackMode::Single, "--single"),
        ];
        for (mode, flag) in expected {
            let plan = build_plan(&config(), InputFileType::Raw, mode, &full_params())
                .expect("plan");
            assert_eq!(plan.len(), 1, "mode {mode}");
            assert_eq!(plan.stages()[0].args[0], flag, "mode {mode}");
        }
    }

    #[test]
    fn test_zip_single_scenario() {
        let params = CrackParams::new("/data/secret.zip");
        let plan = build_plan(
            &config(),
            InputFileType::Archive(ArchiveFormat::Zip),
            AttackMode::Single,
            &params,
        )
        .expect("plan");

        let stages = plan.stages();
        assert_eq!(stages.len(), 2);
        assert_eq!(stages[0].program, "zip2john");
        assert_eq!(stages[0].args, vec!["/data/secret.zip"]);
        assert_eq!(
            stages[0].output_artifact,
            Some(PathBuf::from("/tmp/hash.txt"))
        );
        assert_eq!(stages[1].program, "john");
        assert_eq!(stages[1].args, vec!["--single", "/tmp/hash.txt"]);
    }

    #[test]
    fn test_archive_plans_hand_off_artifact() {
        for file_type in archives() {
            for mode in AttackMode::ALL {
                let plan = build_plan(&config(), file_type, mode, &full_params()).expect("plan");
                let stages = plan.stages();
                assert_eq!(stages.len(), 2);
                assert!(stages[0].output_artifact.is_some());
                assert_eq!(stages[1].input_artifact, stages[0].output_artifact);
                assert_eq!(
                    stages[0].program,
                    format!("{}2john", file_type.name())
                );
            }
        }
    }

    #[test]
    fn test_archive_dictionary_falls_back_to_default_wordlist() {
        let plan = build_plan(
            &config(),
            InputFileType::Archive(ArchiveFormat::Rar),
            AttackMode::Dictionary,
            &CrackParams::new("/data/secret.rar"),
        )
        .expect("plan");
        assert_eq!(
            plan.stages()[1].args,
            vec!["--wordlist=/usr/share/wordlists/john.lst", "/tmp/hash.txt"]
        );
    }

    #[test]
    fn test_archive_dictionary_honours_override() {
        let plan = build_plan(
            &config(),
            InputFileType::Archive(ArchiveFormat::Zip),
            AttackMode::Dictionary,
            &CrackParams::new("/data/secret.zip").with_wordlist("/tmp/w.lst"),
        )
        .expect("plan");
        assert_eq!(plan.stages()[1].args[0], "--wordlist=/tmp/w.lst");
    }

    #[test]
    fn test_raw_dictionary_requires_wordlist() {
        let err = build_plan(
            &config(),
            InputFileType::Raw,
            AttackMode::Dictionary,
            &CrackParams::new("/data/shadow").with_wordlist(""),
        )
        .unwrap_err();
        assert_eq!(
            err,
            BuildError::MissingParameter {
                mode: "dictionary",
                parameter: "wordlist"
            }
        );
    }

    #[test]
    fn test_incremental_requires_order() {
        for file_type in [InputFileType::Raw, archives()[0]] {
            let err = build_plan(
                &config(),
                file_type,
                AttackMode::Incremental,
                &CrackParams::new("/data/target"),
            )
            .unwrap_err();
            assert!(matches!(err, BuildError::MissingParameter { .. }));
        }
    }

    #[test]
    fn test_hash_hint_passed_through() {
        let params = CrackParams::new("/data/shadow").with_hash_hint("md5crypt");
        let plan = build_plan(&config(), InputFileType::Raw, AttackMode::Single, &params)
            .expect("plan");
        assert_eq!(
            plan.stages()[0].args,
            vec!["--single", "--format=md5crypt", "/data/shadow"]
        );
    }

    #[test]
    fn test_blank_hash_hint_ignored() {
        let params = CrackParams::new("/data/shadow").with_hash_hint("  ");
        let plan = build_plan(&config(), InputFileType::Raw, AttackMode::Single, &params)
            .expect("plan");
        assert_eq!(plan.stages()[0].args, vec!["--single", "/data/shadow"]);
    }

    #[test]
    fn test_target_with_spaces_stays_one_argument() {
        let params = CrackParams::new("/data/my secrets; rm -rf.zip");
        let plan = build_plan(
            &config(),
            InputFileType::Archive(ArchiveFormat::Zip),
            AttackMode::Single,
            &params,
        )
        .expect("plan");
        assert_eq!(plan.stages()[0].args, vec!["/data/my secrets; rm -rf.zip"]);
    }

    #[cfg(unix)]
    #[test]
    fn test_non_utf8_target_rejected() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let target = PathBuf::from(OsStr::from_bytes(b"/data/secr\xffet.zip"));
        for file_type in [InputFileType::Raw, archives()[0]] {
            let err = build_plan(
                &config(),
                file_type,
                AttackMode::Single,
                &CrackParams::new(&target),
            )
            .unwrap_err();
            assert_eq!(
                err,
                BuildError::NonUtf8Path {
                    role: "target",
                    path: target.clone()
                }
            );
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_non_utf8_wordlist_rejected() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let params = CrackParams::new("/data/shadow")
            .with_wordlist(PathBuf::from(OsStr::from_bytes(b"/tmp/w\xfe.lst")));
        let err = build_plan(&config(), InputFileType::Raw, AttackMode::Dictionary, &params)
            .unwrap_err();
        assert!(matches!(
            err,
            BuildError::NonUtf8Path {
                role: "wordlist",
                ..
            }
        ));
    }

    #[test]
    fn test_extractor_dir_used_for_archives() {
        let config = config().with_extractor_dir("/opt/john/run");
        let plan = build_plan(
            &config,
            InputFileType::Archive(ArchiveFormat::Zip),
            AttackMode::Single,
            &CrackParams::new("/data/secret.zip"),
        )
        .expect("plan");
        assert_eq!(plan.stages()[0].program, "/opt/john/run/zip2john");
    }

    #[test]
    fn test_empty_target_rejected() {
        let err = build_plan(
            &config(),
            InputFileType::Raw,
            AttackMode::Single,
            &CrackParams::default(),
        )
        .unwrap_err();
        assert_eq!(err, BuildError::EmptyTarget);
    }

    #[test]
    fn test_unrecognized_strings_are_construction_errors() {
        let params = CrackParams::new("/data/x");
        assert!(matches!(
            build_plan_from_strs(&config(), "7z", "single", &params),
            Err(BuildError::UnknownFileType(_))
        ));
        assert!(matches!(
            build_plan_from_strs(&config(), "zip", "hybrid", &params),
            Err(BuildError::UnknownAttackMode(_))
        ));
        assert!(build_plan_from_strs(&config(), "zip", "single", &params).is_ok());
    }
}
