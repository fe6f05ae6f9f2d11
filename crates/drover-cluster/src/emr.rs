//! [`ClusterControlPlane`] backed by Amazon EMR.

use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region};
use aws_sdk_emr::error::{BuildError, ProvideErrorMetadata, SdkError};
use aws_sdk_emr::types::{
    self as emr, Application, Configuration, EbsBlockDeviceConfig, EbsConfiguration,
    HadoopJarStepConfig, InstanceGroupConfig, InstanceRoleType, JobFlowInstancesConfig,
    MarketType, ScaleDownBehavior, VolumeSpecification,
};
use aws_sdk_emr::Client;
use tracing::debug;

use drover_core::config::InstanceGroup;
use drover_core::control_plane::{JobFlowRequest, StepConfig};
use drover_core::{
    ActionOnFailure, ClusterControlPlane, ClusterDescription, ClusterId, ClusterState,
    DroverConfig, DroverError, FailureDetails, Result, StepDescription, StepId, StepState,
    StepSummary,
};

/// EMR client wrapper.
#[derive(Debug, Clone)]
pub struct EmrControlPlane {
    client: Client,
}

impl EmrControlPlane {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Build a client for the configured region using the default AWS
    /// credential chain.
    pub async fn from_config(config: &DroverConfig) -> Self {
        let sdk_config = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(config.region.clone()))
            .load()
            .await;
        Self::new(Client::new(&sdk_config))
    }
}

fn build_error(what: &str, err: BuildError) -> DroverError {
    DroverError::Config {
        message: format!("Invalid {what}: {err}"),
    }
}

/// Classify an SDK failure. `target` names the cluster or step the call was about.
fn map_sdk_error<E, R>(what: &str, target: &str, err: SdkError<E, R>) -> DroverError
where
    E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
    R: std::fmt::Debug + Send + Sync + 'static,
{
    let code = err.code().unwrap_or_default().to_string();
    let message = err.message().unwrap_or_default().to_lowercase();

    if code.starts_with("AccessDenied") {
        return DroverError::access(target, err);
    }
    if code == "ResourceNotFoundException"
        || (code == "InvalidRequestException"
            && (message.contains("does not exist") || message.contains("not found")))
    {
        return DroverError::not_found(target);
    }
    DroverError::transport(format!("{what} {target}"), err)
}

fn instance_group(group: &InstanceGroup) -> Result<InstanceGroupConfig> {
    let mut builder = InstanceGroupConfig::builder()
        .name(&group.name)
        .instance_role(InstanceRoleType::from(group.role.as_str()))
        .instance_type(&group.instance_type)
        .instance_count(group.instance_count)
        .market(MarketType::from(group.market.as_str()));

    if let Some(ebs) = &group.ebs {
        let volume = VolumeSpecification::builder()
            .volume_type(&ebs.volume_type)
            .size_in_gb(ebs.size_gb)
            .build();
        let device = EbsBlockDeviceConfig::builder()
            .volume_specification(volume)
            .volumes_per_instance(ebs.volumes_per_instance)
            .build();
        builder = builder.ebs_configuration(
            EbsConfiguration::builder()
                .ebs_block_device_configs(device)
                .build(),
        );
    }

    Ok(builder.build())
}

fn step_config(step: &StepConfig) -> Result<emr::StepConfig> {
    let jar_step = HadoopJarStepConfig::builder()
        .jar(&step.jar)
        .set_args(Some(step.args.clone()))
        .build();
    Ok(emr::StepConfig::builder()
        .name(&step.name)
        .action_on_failure(emr::ActionOnFailure::from(step.action_on_failure.as_str()))
        .hadoop_jar_step(jar_step)
        .build())
}

fn parse_state<T: std::str::FromStr<Err = DroverError>>(raw: Option<&str>, what: &str) -> Result<T> {
    raw.ok_or_else(|| DroverError::Internal {
        message: format!("EMR returned no {what}"),
    })?
    .parse()
}

#[async_trait]
impl ClusterControlPlane for EmrControlPlane {
    async fn run_job_flow(&self, request: &JobFlowRequest) -> Result<ClusterId> {
        let template = &request.template;

        let mut instances = JobFlowInstancesConfig::builder()
            .set_ec2_key_name(request.ec2_key_name.clone())
            .keep_job_flow_alive_when_no_steps(request.keep_alive)
            .termination_protected(template.termination_protected)
            .set_ec2_subnet_id(template.subnet_id.clone())
            .set_emr_managed_master_security_group(template.master_security_group.clone())
            .set_emr_managed_slave_security_group(template.slave_security_group.clone());
        for group in &template.instance_groups {
            instances = instances.instance_groups(instance_group(group)?);
        }

        let applications = template
            .applications
            .iter()
            .map(|name| Application::builder().name(name).build())
            .collect();

        let mut spark = Configuration::builder().classification("spark");
        for (key, value) in &template.spark_properties {
            spark = spark.properties(key, value);
        }

        let steps = request
            .steps
            .iter()
            .map(step_config)
            .collect::<Result<Vec<_>>>()?;

        let output = self
            .client
            .run_job_flow()
            .name(&request.name)
            .set_log_uri(request.log_uri.clone())
            .release_label(&template.release_label)
            .instances(instances.build())
            .set_applications(Some(applications))
            .configurations(spark.build())
            .set_steps(Some(steps))
            .visible_to_all_users(template.visible_to_all_users)
            .job_flow_role(&template.job_flow_role)
            .service_role(&template.service_role)
            .set_auto_scaling_role(template.auto_scaling_role.clone())
            .set_scale_down_behavior(
                template
                    .scale_down_behavior
                    .as_deref()
                    .map(ScaleDownBehavior::from),
            )
            .ebs_root_volume_size(template.ebs_root_volume_size)
            .send()
            .await
            .map_err(|e| map_sdk_error("RunJobFlow", &request.name, e))?;

        let id = output.job_flow_id().ok_or_else(|| DroverError::Internal {
            message: "RunJobFlow returned no cluster id".to_string(),
        })?;
        debug!(cluster_id = id, "RunJobFlow accepted");
        Ok(ClusterId::new(id))
    }

    async fn add_steps(&self, cluster_id: &ClusterId, steps: &[StepConfig]) -> Result<Vec<StepId>> {
        let steps = steps.iter().map(step_config).collect::<Result<Vec<_>>>()?;
        let output = self
            .client
            .add_job_flow_steps()
            .job_flow_id(cluster_id.as_str())
            .set_steps(Some(steps))
            .send()
            .await
            .map_err(|e| map_sdk_error("AddJobFlowSteps", cluster_id.as_str(), e))?;
        Ok(output.step_ids().iter().map(StepId::new).collect())
    }

    async fn list_steps(&self, cluster_id: &ClusterId) -> Result<Vec<StepSummary>> {
        let mut pages = self
            .client
            .list_steps()
            .cluster_id(cluster_id.as_str())
            .into_paginator()
            .send();

        let mut steps = Vec::new();
        while let Some(page) = pages.next().await {
            let page = page.map_err(|e| map_sdk_error("ListSteps", cluster_id.as_str(), e))?;
            for step in page.steps() {
                let status = step.status();
                steps.push(StepSummary {
                    id: StepId::new(step.id().unwrap_or_default()),
                    name: step.name().unwrap_or_default().to_string(),
                    state: parse_state(
                        status.and_then(|s| s.state()).map(|s| s.as_str()),
                        "step state",
                    )?,
                });
            }
        }
        // EMR lists the newest step first.
        steps.reverse();
        Ok(steps)
    }

    async fn describe_step(&self, cluster_id: &ClusterId, step_id: &StepId) -> Result<StepDescription> {
        let target = format!("{cluster_id}/{step_id}");
        let output = self
            .client
            .describe_step()
            .cluster_id(cluster_id.as_str())
            .step_id(step_id.as_str())
            .send()
            .await
            .map_err(|e| map_sdk_error("DescribeStep", &target, e))?;
        let step = output.step().ok_or_else(|| DroverError::not_found(&target))?;

        let status = step.status();
        let state: StepState = parse_state(
            status.and_then(|s| s.state()).map(|s| s.as_str()),
            "step state",
        )?;
        let failure = status.and_then(|s| s.failure_details()).map(|f| FailureDetails {
            reason: f.reason().map(str::to_string),
            message: f.message().map(str::to_string),
            log_file: f.log_file().map(str::to_string),
        });
        let action_on_failure = step
            .action_on_failure()
            .and_then(|a| a.as_str().parse().ok())
            .unwrap_or(ActionOnFailure::Continue);

        Ok(StepDescription {
            id: step_id.clone(),
            name: step.name().unwrap_or_default().to_string(),
            args: step.config().map(|c| c.args().to_vec()).unwrap_or_default(),
            action_on_failure,
            state,
            failure,
        })
    }

    async fn describe_cluster(&self, cluster_id: &ClusterId) -> Result<ClusterDescription> {
        let output = self
            .client
            .describe_cluster()
            .cluster_id(cluster_id.as_str())
            .send()
            .await
            .map_err(|e| map_sdk_error("DescribeCluster", cluster_id.as_str(), e))?;
        let cluster = output
            .cluster()
            .ok_or_else(|| DroverError::not_found(cluster_id.as_str()))?;

        let status = cluster.status();
        let state: ClusterState = parse_state(
            status.and_then(|s| s.state()).map(|s| s.as_str()),
            "cluster state",
        )?;
        Ok(ClusterDescription {
            id: cluster_id.clone(),
            name: cluster.name().unwrap_or_default().to_string(),
            state,
            state_change_reason: status
                .and_then(|s| s.state_change_reason())
                .and_then(|r| r.message())
                .map(str::to_string),
        })
    }

    async fn terminate_cluster(&self, cluster_id: &ClusterId) -> Result<()> {
        self.client
            .terminate_job_flows()
            .job_flow_ids(cluster_id.as_str())
            .send()
            .await
            .map_err(|e| map_sdk_error("TerminateJobFlows", cluster_id.as_str(), e))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use drover_core::{ClusterTemplate, SparkJob, SparkSubmit};

    #[test]
    fn test_default_instance_groups_build() {
        let template = ClusterTemplate::default();
        let groups: Vec<InstanceGroupConfig> = template
            .instance_groups
            .iter()
            .map(|g| instance_group(g).unwrap())
            .collect();
        assert_eq!(groups.len(), 3);
        assert_eq!(groups[2].instance_count(), 32);
        assert_eq!(groups[1].market(), Some(&MarketType::Spot));
        assert!(groups[0].ebs_configuration().is_some());
    }

    #[test]
    fn test_step_config_carries_spark_submit() {
        let job = SparkJob::new("com.acme.ClassA", ["x"]);
        let step = StepConfig {
            name: job.step_name().to_string(),
            action_on_failure: ActionOnFailure::Continue,
            jar: "command-runner.jar".to_string(),
            args: SparkSubmit::default().command("s3://jars/app.jar", &job),
        };
        let built = step_config(&step).unwrap();
        assert_eq!(built.name(), "ClassA");
        assert_eq!(built.action_on_failure(), Some(&emr::ActionOnFailure::Continue));
    }
}
