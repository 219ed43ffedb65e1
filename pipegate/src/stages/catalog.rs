//! The canonical, data-driven stage catalog.
//!
//! One ordered stage list covers every run; differences between quick and
//! full runs are expressed as configuration, not as duplicated pipeline
//! definitions. Each entry declares its enforcement policy, its outcome
//! rule, and the services and artifacts it depends on.

use super::tool::{ArtifactCollector, StepComposer};
use super::{OutcomeRule, StageSpec, ToolStage};
use crate::config::{RunConfig, RunProfile};
use crate::context::ArtifactStore;
use crate::core::{ArtifactKind, GatePolicy, RunArtifact};
use crate::errors::{ConfigError, InfrastructureError};
use crate::services::ServiceKind;
use crate::step::StepSpec;
use crate::substrate::Substrate;
use std::sync::Arc;

const BUILDER_IMAGE: &str = "mcr.microsoft.com/dotnet/sdk:8.0";
const TRUFFLEHOG_IMAGE: &str = "trufflesecurity/trufflehog:latest";
const SEMGREP_IMAGE: &str = "returntocorp/semgrep:latest";
const TRIVY_IMAGE: &str = "aquasec/trivy:latest";
const CHECKOV_IMAGE: &str = "bridgecrew/checkov:latest";
const CONFTEST_IMAGE: &str = "openpolicyagent/conftest:latest";
const SYFT_IMAGE: &str = "anchore/syft:latest";
const SKOPEO_IMAGE: &str = "quay.io/skopeo/stable:latest";
const COSIGN_IMAGE: &str = "gcr.io/projectsigstore/cosign:latest";
const KUBECTL_IMAGE: &str = "bitnami/kubectl:latest";
const ZAP_IMAGE: &str = "ghcr.io/zaproxy/zaproxy:stable";
const NUCLEI_IMAGE: &str = "projectdiscovery/nuclei:latest";
const K6_IMAGE: &str = "grafana/k6:latest";

/// Names in the quick profile: everything up to and including the image
/// checks, nothing that needs a backing service.
const QUICK_STAGES: [&str; 13] = [
    "secret-scan",
    "sast-scan",
    "static-analysis",
    "build",
    "code-coverage",
    "dependency-scan",
    "license-scan",
    "iac-scan",
    "policy-check",
    "sbom",
    "package",
    "image-scan",
    "cis-benchmark",
];

/// Builds stage specifications against a given execution substrate.
pub struct Catalog {
    substrate: Arc<dyn Substrate>,
}

impl Catalog {
    /// Creates a catalog over the given substrate.
    #[must_use]
    pub fn new(substrate: Arc<dyn Substrate>) -> Self {
        Self { substrate }
    }

    /// The canonical stage names, in execution order.
    #[must_use]
    pub fn stage_names() -> Vec<&'static str> {
        vec![
            "secret-scan",
            "sast-scan",
            "static-analysis",
            "build",
            "code-coverage",
            "dependency-scan",
            "license-scan",
            "iac-scan",
            "policy-check",
            "sbom",
            "package",
            "image-scan",
            "cis-benchmark",
            "push",
            "sign",
            "deploy-datastore",
            "deploy-app",
            "integration-test",
            "dast-scan",
            "api-security-test",
            "performance-test",
            "mutation-test",
            "publish",
        ]
    }

    /// Resolves the ordered stage list for a configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] for unknown stage names in a custom profile,
    /// or when the sign stage is active without a signing key.
    pub fn resolve(&self, config: &RunConfig) -> Result<Vec<StageSpec>, ConfigError> {
        let selected: Vec<StageSpec> = match &config.profile {
            RunProfile::Quick => self
                .all(config)
                .into_iter()
                .filter(|s| QUICK_STAGES.contains(&s.name.as_str()))
                .collect(),
            RunProfile::Full => self.all(config),
            RunProfile::Custom(names) => {
                let known = Self::stage_names();
                for name in names {
                    if !known.contains(&name.as_str()) {
                        return Err(ConfigError::new(format!("unknown stage '{name}'"))
                            .with_field("profile"));
                    }
                }
                // Selection never reorders: the canonical order is total.
                self.all(config)
                    .into_iter()
                    .filter(|s| names.iter().any(|n| n == &s.name))
                    .collect()
            }
        };

        if selected.iter().any(|s| s.name == "sign") && config.signing_key.is_none() {
            return Err(
                ConfigError::new("the sign stage requires a signing key").with_field("signing_key")
            );
        }

        Ok(selected)
    }

    /// Every catalog stage, in canonical order. The publish stage only
    /// joins when external registry credentials are configured.
    fn all(&self, config: &RunConfig) -> Vec<StageSpec> {
        let mut stages = vec![
            self.secret_scan(),
            self.sast_scan(),
            self.static_analysis(),
            self.build(),
            self.code_coverage(),
            self.dependency_scan(),
            self.license_scan(),
            self.iac_scan(),
            self.policy_check(),
            self.sbom(),
            self.package(),
            self.image_scan(),
            self.cis_benchmark(),
            self.push(),
            self.sign(),
            self.deploy_datastore(),
            self.deploy_app(),
            self.integration_test(),
            self.dast_scan(),
            self.api_security_test(),
            self.performance_test(),
            self.mutation_test(),
        ];
        if config.registry_url.is_some()
            && config.registry_username.is_some()
            && config.registry_password.is_some()
        {
            stages.push(self.publish());
        }
        stages
    }

    fn tool(&self, name: &str, rule: OutcomeRule, composer: StepComposer) -> ToolStage {
        ToolStage::new(name, rule, self.substrate.clone(), composer)
    }

    /// TruffleHog exits 183 when verified secrets are found; anything else
    /// non-zero means the scan itself broke.
    fn secret_scan(&self) -> StageSpec {
        let composer: StepComposer = Arc::new(|_ctx, _artifacts| {
            Ok(StepSpec::builder(TRUFFLEHOG_IMAGE)
                .args(["filesystem", "/src", "--json", "--no-update", "--fail"])
                .args(["--exclude-paths=.git", "--exclude-paths=node_modules"])
                .workdir("/src")
                .build()?)
        });
        let stage = self.tool("secret-scan", OutcomeRule::FindingCodes(vec![183]), composer);
        StageSpec::new("secret-scan", GatePolicy::Hard, Arc::new(stage))
    }

    fn sast_scan(&self) -> StageSpec {
        let composer: StepComposer = Arc::new(|_ctx, _artifacts| {
            Ok(StepSpec::builder(SEMGREP_IMAGE)
                .arg("semgrep")
                .args(["--config=p/security-audit", "--config=p/owasp-top-ten"])
                .args(["--metrics=off", "--error", "--sarif"])
                .workdir("/src")
                .build()?)
        });
        let stage = self.tool("sast-scan", OutcomeRule::FindingCodes(vec![1]), composer);
        StageSpec::new("sast-scan", GatePolicy::Hard, Arc::new(stage))
    }

    fn static_analysis(&self) -> StageSpec {
        let composer: StepComposer = Arc::new(|_ctx, _artifacts| {
            Ok(StepSpec::builder(BUILDER_IMAGE)
                .args(["dotnet", "format", "--verify-no-changes"])
                .workdir("/src")
                .build()?)
        });
        let stage = self.tool("static-analysis", OutcomeRule::NonZeroIsFindings, composer);
        StageSpec::new("static-analysis", GatePolicy::Soft, Arc::new(stage))
    }

    /// Compile and unit-test; a compiler or test failure is the meaningful
    /// result, so every non-zero exit is a finding under the hard policy.
    fn build(&self) -> StageSpec {
        let composer: StepComposer = Arc::new(|_ctx, _artifacts| {
            Ok(StepSpec::builder(BUILDER_IMAGE)
                .args(["dotnet", "build", "-c", "Release"])
                .env("DOTNET_CLI_TELEMETRY_OPTOUT", "1")
                .workdir("/src")
                .build()?)
        });
        let stage = self.tool("build", OutcomeRule::NonZeroIsFindings, composer);
        StageSpec::new("build", GatePolicy::Hard, Arc::new(stage))
    }

    fn code_coverage(&self) -> StageSpec {
        let composer: StepComposer = Arc::new(|ctx, _artifacts| {
            let minimum = ctx.config().min_coverage;
            Ok(StepSpec::builder(BUILDER_IMAGE)
                .args(["dotnet", "test", "--collect:XPlat Code Coverage"])
                .env("COVERAGE_MINIMUM", minimum.to_string())
                .workdir("/src")
                .build()?)
        });
        let stage = self.tool("code-coverage", OutcomeRule::NonZeroIsFindings, composer);
        StageSpec::new("code-coverage", GatePolicy::Soft, Arc::new(stage))
    }

    fn dependency_scan(&self) -> StageSpec {
        let composer: StepComposer = Arc::new(|ctx, _artifacts| {
            Ok(StepSpec::builder(TRIVY_IMAGE)
                .args(["fs", "--scanners", "vuln"])
                .args(["--severity", ctx.config().severity.tool_arg()])
                .args(["--exit-code", "1", "--format", "json", "."])
                .workdir("/src")
                .build()?)
        });
        let stage = self.tool("dependency-scan", OutcomeRule::FindingCodes(vec![1]), composer);
        StageSpec::new("dependency-scan", GatePolicy::Hard, Arc::new(stage))
    }

    fn license_scan(&self) -> StageSpec {
        let composer: StepComposer = Arc::new(|ctx, _artifacts| {
            Ok(StepSpec::builder(TRIVY_IMAGE)
                .args(["fs", "--scanners", "license", "--license-full"])
                .args(["--severity", ctx.config().severity.tool_arg()])
                .args(["--exit-code", "1", "--format", "json", "."])
                .workdir("/src")
                .build()?)
        });
        let stage = self.tool("license-scan", OutcomeRule::FindingCodes(vec![1]), composer);
        StageSpec::new("license-scan", GatePolicy::Hard, Arc::new(stage))
    }

    fn iac_scan(&self) -> StageSpec {
        let composer: StepComposer = Arc::new(|_ctx, _artifacts| {
            Ok(StepSpec::builder(CHECKOV_IMAGE)
                .args(["-d", "k8s", "--framework", "kubernetes", "--compact", "--quiet"])
                .workdir("/src")
                .build()?)
        });
        let stage = self.tool("iac-scan", OutcomeRule::NonZeroIsFindings, composer);
        StageSpec::new("iac-scan", GatePolicy::Informational, Arc::new(stage))
    }

    fn policy_check(&self) -> StageSpec {
        let composer: StepComposer = Arc::new(|_ctx, _artifacts| {
            Ok(StepSpec::builder(CONFTEST_IMAGE)
                .args(["test", "k8s/", "--policy", "/policy", "--output", "json"])
                .workdir("/src")
                .build()?)
        });
        let stage = self.tool("policy-check", OutcomeRule::NonZeroIsFindings, composer);
        StageSpec::new("policy-check", GatePolicy::Informational, Arc::new(stage))
    }

    fn sbom(&self) -> StageSpec {
        let composer: StepComposer = Arc::new(|_ctx, _artifacts| {
            Ok(StepSpec::builder(SYFT_IMAGE)
                .args(["dir:/src", "-o", "spdx-json"])
                .workdir("/src")
                .build()?)
        });
        let collector: ArtifactCollector = Arc::new(|_ctx, _artifacts, result| {
            let payload = serde_json::from_str(&result.output)
                .unwrap_or_else(|_| serde_json::json!({ "raw": result.output }));
            vec![RunArtifact::new(ArtifactKind::Sbom, "dependency-manifest", "spdx-json")
                .with_payload(payload)]
        });
        let stage = self
            .tool("sbom", OutcomeRule::NonZeroIsFindings, composer)
            .with_collector(collector);
        StageSpec::new("sbom", GatePolicy::Soft, Arc::new(stage))
            .produces(ArtifactKind::Sbom)
    }

    fn package(&self) -> StageSpec {
        let composer: StepComposer = Arc::new(|ctx, _artifacts| {
            Ok(StepSpec::builder(BUILDER_IMAGE)
                .args(["dotnet", "publish", "-c", "Release", "-o", "/app/publish"])
                .env("TARGET", ctx.config().target.clone())
                .workdir("/src")
                .build()?)
        });
        let collector: ArtifactCollector = Arc::new(|ctx, _artifacts, result| {
            let target = &ctx.config().target;
            vec![
                RunArtifact::new(ArtifactKind::Package, target.clone(), format!("{target}.tar"))
                    .with_digest_of(result.output.as_bytes()),
            ]
        });
        let stage = self
            .tool("package", OutcomeRule::NonZeroIsFindings, composer)
            .with_collector(collector);
        StageSpec::new("package", GatePolicy::Hard, Arc::new(stage))
            .produces(ArtifactKind::Package)
    }

    fn image_scan(&self) -> StageSpec {
        let composer: StepComposer = Arc::new(|ctx, artifacts| {
            let package = require_artifact(artifacts, ArtifactKind::Package)?;
            Ok(StepSpec::builder(TRIVY_IMAGE)
                .args(["image", "--input", &package.reference])
                .args(["--severity", ctx.config().severity.tool_arg()])
                .args(["--exit-code", "1", "--format", "json"])
                .input(ArtifactKind::Package)
                .build()?)
        });
        let stage = self.tool("image-scan", OutcomeRule::FindingCodes(vec![1]), composer);
        StageSpec::new("image-scan", GatePolicy::Hard, Arc::new(stage))
            .with_need(ArtifactKind::Package)
    }

    fn cis_benchmark(&self) -> StageSpec {
        let composer: StepComposer = Arc::new(|_ctx, artifacts| {
            let package = require_artifact(artifacts, ArtifactKind::Package)?;
            Ok(StepSpec::builder(TRIVY_IMAGE)
                .args(["image", "--input", &package.reference])
                .args(["--compliance", "docker-cis", "--format", "json"])
                .input(ArtifactKind::Package)
                .build()?)
        });
        let stage = self.tool("cis-benchmark", OutcomeRule::NonZeroIsFindings, composer);
        StageSpec::new("cis-benchmark", GatePolicy::Informational, Arc::new(stage))
            .with_need(ArtifactKind::Package)
    }

    fn push(&self) -> StageSpec {
        let composer: StepComposer = Arc::new(|ctx, artifacts| {
            let package = require_artifact(artifacts, ArtifactKind::Package)?;
            let registry = require_endpoint(ctx, ServiceKind::Registry)?;
            let image_ref = ctx.config().image_ref(registry.as_str());
            Ok(StepSpec::builder(SKOPEO_IMAGE)
                .arg("copy")
                .arg(format!("docker-archive:{}", package.reference))
                .arg(format!("docker://{image_ref}"))
                .args(["--dest-tls-verify=false"])
                .binding("registry", registry.as_str())
                .input(ArtifactKind::Package)
                .build()?)
        });
        let collector: ArtifactCollector = Arc::new(|ctx, _artifacts, result| {
            let registry = ctx
                .endpoint(ServiceKind::Registry)
                .map_or_else(|| "registry".to_string(), |e| e.as_str().to_string());
            let image_ref = ctx.config().image_ref(&registry);
            vec![
                RunArtifact::new(ArtifactKind::ImageReference, ctx.config().target.clone(), image_ref)
                    .with_digest_of(result.output.as_bytes()),
            ]
        });
        let stage = self
            .tool("push", OutcomeRule::NonZeroIsExecutionFailure, composer)
            .with_collector(collector);
        StageSpec::new("push", GatePolicy::Hard, Arc::new(stage))
            .with_service(ServiceKind::Registry)
            .with_need(ArtifactKind::Package)
            .produces(ArtifactKind::ImageReference)
    }

    fn sign(&self) -> StageSpec {
        let composer: StepComposer = Arc::new(|_ctx, artifacts| {
            let image = require_artifact(artifacts, ArtifactKind::ImageReference)?;
            Ok(StepSpec::builder(COSIGN_IMAGE)
                .args(["cosign", "sign", "--key", "env://COSIGN_PRIVATE_KEY"])
                .args(["--tlog-upload=false"])
                .arg(&image.reference)
                .secret("COSIGN_PRIVATE_KEY", "signing_key")
                .secret("COSIGN_PASSWORD", "signing_password")
                .input(ArtifactKind::ImageReference)
                .build()?)
        });
        let collector: ArtifactCollector = Arc::new(|ctx, artifacts, result| {
            let reference = artifacts
                .latest(ArtifactKind::ImageReference)
                .map_or_else(String::new, |a| a.reference.clone());
            vec![
                RunArtifact::new(ArtifactKind::SignedReference, ctx.config().target.clone(), reference)
                    .with_payload(serde_json::json!({ "signature": result.output })),
            ]
        });
        let stage = self
            .tool("sign", OutcomeRule::NonZeroIsExecutionFailure, composer)
            .with_collector(collector);
        StageSpec::new("sign", GatePolicy::Hard, Arc::new(stage))
            .with_need(ArtifactKind::ImageReference)
            .produces(ArtifactKind::SignedReference)
    }

    fn deploy_datastore(&self) -> StageSpec {
        let composer: StepComposer = Arc::new(|ctx, _artifacts| {
            let cluster = require_endpoint(ctx, ServiceKind::Cluster)?;
            let datastore = require_endpoint(ctx, ServiceKind::DataStore)?;
            Ok(StepSpec::builder(KUBECTL_IMAGE)
                .args(["apply", "-f", "/manifests/datastore.yaml"])
                .args(["--wait", "--timeout=300s"])
                .binding("cluster", cluster.as_str())
                .binding("datastore", datastore.as_str())
                .build()?)
        });
        let stage = self.tool("deploy-datastore", OutcomeRule::NonZeroIsFindings, composer);
        StageSpec::new("deploy-datastore", GatePolicy::Hard, Arc::new(stage))
            .with_service(ServiceKind::Cluster)
            .with_service(ServiceKind::DataStore)
    }

    fn deploy_app(&self) -> StageSpec {
        let composer: StepComposer = Arc::new(|ctx, artifacts| {
            let cluster = require_endpoint(ctx, ServiceKind::Cluster)?;
            let image = require_artifact(artifacts, ArtifactKind::ImageReference)?;
            Ok(StepSpec::builder(KUBECTL_IMAGE)
                .args(["apply", "-f", "/manifests/app.yaml"])
                .args(["--wait", "--timeout=300s"])
                .env("IMAGE", image.reference.clone())
                .binding("cluster", cluster.as_str())
                .input(ArtifactKind::ImageReference)
                .build()?)
        });
        let stage = self.tool("deploy-app", OutcomeRule::NonZeroIsFindings, composer);
        StageSpec::new("deploy-app", GatePolicy::Hard, Arc::new(stage))
            .with_service(ServiceKind::Cluster)
            .with_need(ArtifactKind::ImageReference)
    }

    fn integration_test(&self) -> StageSpec {
        let composer: StepComposer = Arc::new(|ctx, _artifacts| {
            let cluster = require_endpoint(ctx, ServiceKind::Cluster)?;
            Ok(StepSpec::builder(BUILDER_IMAGE)
                .args(["dotnet", "test", "--filter", "Category=Integration"])
                .binding("cluster", cluster.as_str())
                .workdir("/src")
                .build()?)
        });
        let stage = self.tool("integration-test", OutcomeRule::NonZeroIsFindings, composer);
        StageSpec::new("integration-test", GatePolicy::Hard, Arc::new(stage))
            .with_service(ServiceKind::Cluster)
    }

    /// ZAP's baseline scan exits 1 on warnings and 2 on failures; both are
    /// findings. Higher codes mean the scan itself broke.
    fn dast_scan(&self) -> StageSpec {
        let composer: StepComposer = Arc::new(|ctx, _artifacts| {
            let cluster = require_endpoint(ctx, ServiceKind::Cluster)?;
            Ok(StepSpec::builder(ZAP_IMAGE)
                .args(["zap-baseline.py", "-t", "http://app:8080", "-J", "report.json"])
                .binding("cluster", cluster.as_str())
                .build()?)
        });
        let stage = self.tool("dast-scan", OutcomeRule::FindingCodes(vec![1, 2]), composer);
        StageSpec::new("dast-scan", GatePolicy::Hard, Arc::new(stage))
            .with_service(ServiceKind::Cluster)
    }

    fn api_security_test(&self) -> StageSpec {
        let composer: StepComposer = Arc::new(|ctx, _artifacts| {
            let cluster = require_endpoint(ctx, ServiceKind::Cluster)?;
            Ok(StepSpec::builder(NUCLEI_IMAGE)
                .args(["-u", "http://app:8080", "-tags", "api,owasp-api-top-10"])
                .args(["-severity", "high,critical", "-j", "-silent"])
                .binding("cluster", cluster.as_str())
                .build()?)
        });
        let stage = self.tool("api-security-test", OutcomeRule::FindingCodes(vec![1]), composer);
        StageSpec::new("api-security-test", GatePolicy::Hard, Arc::new(stage))
            .with_service(ServiceKind::Cluster)
    }

    /// k6 exits 99 when thresholds fail; that is the finding. Other
    /// non-zero codes mean the load generator itself broke.
    fn performance_test(&self) -> StageSpec {
        let composer: StepComposer = Arc::new(|ctx, _artifacts| {
            let cluster = require_endpoint(ctx, ServiceKind::Cluster)?;
            let config = ctx.config();
            Ok(StepSpec::builder(K6_IMAGE)
                .args(["run", "/scripts/load.js"])
                .env("K6_VUS", config.perf_virtual_users.to_string())
                .env("K6_DURATION", config.perf_duration.clone())
                .binding("cluster", cluster.as_str())
                .build()?)
        });
        let stage = self.tool("performance-test", OutcomeRule::FindingCodes(vec![99]), composer);
        StageSpec::new("performance-test", GatePolicy::Soft, Arc::new(stage))
            .with_service(ServiceKind::Cluster)
    }

    fn mutation_test(&self) -> StageSpec {
        let composer: StepComposer = Arc::new(|ctx, _artifacts| {
            let minimum = ctx.config().min_mutation_score;
            Ok(StepSpec::builder(BUILDER_IMAGE)
                .args(["dotnet", "stryker"])
                .arg(format!("--threshold-break={minimum}"))
                .workdir("/src")
                .build()?)
        });
        let stage = self.tool("mutation-test", OutcomeRule::NonZeroIsFindings, composer);
        StageSpec::new("mutation-test", GatePolicy::Soft, Arc::new(stage))
    }

    /// Publish to an external registry; only joins the run when credentials
    /// are configured.
    fn publish(&self) -> StageSpec {
        let composer: StepComposer = Arc::new(|ctx, artifacts| {
            let image = require_artifact(artifacts, ArtifactKind::ImageReference)?;
            let config = ctx.config();
            let url = config.registry_url.clone().ok_or_else(|| {
                InfrastructureError::new("publish stage active without a registry url")
            })?;
            let dest = config.image_ref(&url);
            Ok(StepSpec::builder(SKOPEO_IMAGE)
                .arg("copy")
                .arg(format!("docker://{}", image.reference))
                .arg(format!("docker://{dest}"))
                .secret("REGISTRY_USERNAME", "registry_username")
                .secret("REGISTRY_PASSWORD", "registry_password")
                .input(ArtifactKind::ImageReference)
                .build()?)
        });
        let stage = self.tool("publish", OutcomeRule::NonZeroIsExecutionFailure, composer);
        StageSpec::new("publish", GatePolicy::Hard, Arc::new(stage))
            .with_need(ArtifactKind::ImageReference)
    }
}

fn require_endpoint(
    ctx: &crate::context::RunContext,
    kind: ServiceKind,
) -> Result<crate::services::Endpoint, InfrastructureError> {
    ctx.endpoint(kind).ok_or_else(|| {
        InfrastructureError::new(format!("no '{kind}' endpoint bound for this stage"))
    })
}

fn require_artifact(
    artifacts: &ArtifactStore,
    kind: ArtifactKind,
) -> Result<RunArtifact, InfrastructureError> {
    artifacts.latest(kind).cloned().ok_or_else(|| {
        InfrastructureError::new(format!("required artifact of kind '{kind}' was never produced"))
    })
}
