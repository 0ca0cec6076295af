use colored::Colorize;

use crate::error::OpsError;

/// Validates that the external tools a command shells out to are installed.
pub struct PrerequisitesValidator {
    requirements: Vec<Requirement>,
}

struct Requirement {
    binary: &'static str,
    install_instructions: &'static str,
}

const DOCKER: Requirement = Requirement {
    binary: "docker",
    install_instructions: "Install Docker from https://docker.com",
};

impl PrerequisitesValidator {
    /// Requirements for a command. `docker` is only needed when images are
    /// built.
    #[must_use]
    pub fn new(needs_docker: bool) -> Self {
        let mut requirements = vec![Requirement {
            binary: "yc",
            install_instructions:
                "Install the Yandex Cloud CLI from https://yandex.cloud/en/docs/cli/quickstart",
        }];

        if needs_docker {
            requirements.push(DOCKER);
        }

        Self { requirements }
    }

    /// Requirements for commands that only touch the local docker daemon.
    #[must_use]
    pub fn docker_only() -> Self {
        Self {
            requirements: vec![DOCKER],
        }
    }

    /// Names of the tools that are required but not on `PATH`.
    #[must_use]
    pub fn missing(&self) -> Vec<String> {
        self.requirements
            .iter()
            .filter(|r| which::which(r.binary).is_err())
            .map(|r| r.binary.to_string())
            .collect()
    }

    /// Check every requirement and print the result.
    ///
    /// # Errors
    ///
    /// Returns [`OpsError::ToolMissing`] listing every absent tool.
    pub fn validate(&self) -> Result<(), OpsError> {
        let missing = self.missing();

        for requirement in &self.requirements {
            let found = !missing.iter().any(|m| m == requirement.binary);
            if !found {
                println!("  {} {} not found", "✗".red(), requirement.binary.bold());
                println!("    {}", requirement.install_instructions.bright_black());
            }
        }

        if missing.is_empty() {
            Ok(())
        } else {
            Err(OpsError::ToolMissing(missing))
        }
    }
}
