//! Composes the pipeline Pod/Job spec: `reader` → user stages → `work-writer`
//! init containers, `status-writer` main container, three empty-dir volumes
//! plus the projected `promise-cluster-selectors` ConfigMap volume (§4.3).

use k8s_openapi::api::core::v1::{
    ConfigMapProjection, Container, EmptyDirVolumeSource, EnvVar, PodSpec, PodTemplateSpec,
    ProjectedVolumeSource, Volume, VolumeMount, VolumeProjection,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kratix_types::PipelineStage;
use std::collections::BTreeMap;

use crate::workflow::objects::{destination_selectors_configmap_name, pipeline_service_account_name};

pub const VOLUME_INPUT: &str = "input";
pub const VOLUME_OUTPUT: &str = "output";
pub const VOLUME_METADATA: &str = "metadata";
pub const VOLUME_CLUSTER_SELECTORS: &str = "promise-cluster-selectors";

/// Whether this pod runs a Promise-level or resource-request-level pipeline.
/// Only affects which labels and which `work-writer` flags are passed.
pub struct PodSpecInput<'a> {
    pub promise_name: &'a str,
    pub namespace: &'a str,
    pub system_namespace: &'a str,
    pub work_creator_image: &'a str,
    pub pipeline_stages: &'a [PipelineStage],
    pub resource_name: Option<&'a str>,
    pub object_yaml_source: ObjectYamlSource<'a>,
}

/// How `reader` locates the object to dump to `/output/object.yaml`.
pub struct ObjectYamlSource<'a> {
    pub group: &'a str,
    pub version: &'a str,
    pub kind: &'a str,
    pub plural: &'a str,
    pub name: &'a str,
}

fn volumes(promise_name: &str) -> Vec<Volume> {
    let empty_dir = |name: &str| Volume {
        name: name.to_string(),
        empty_dir: Some(EmptyDirVolumeSource::default()),
        ..Default::default()
    };
    vec![
        empty_dir(VOLUME_INPUT),
        empty_dir(VOLUME_OUTPUT),
        empty_dir(VOLUME_METADATA),
        Volume {
            name: VOLUME_CLUSTER_SELECTORS.to_string(),
            projected: Some(ProjectedVolumeSource {
                sources: Some(vec![VolumeProjection {
                    config_map: Some(ConfigMapProjection {
                        name: destination_selectors_configmap_name(promise_name),
                        ..Default::default()
                    }),
                    ..Default::default()
                }]),
                ..Default::default()
            }),
            ..Default::default()
        },
    ]
}

/// Writes the triggering object to `/output/object.yaml`, but the mount
/// backing `/output` here is the `input` volume — the same one the pipeline
/// stages mount at `/input` — so the object lands where the user pipeline
/// actually looks for it.
fn reader_container(source: &ObjectYamlSource<'_>) -> Container {
    Container {
        name: "reader".to_string(),
        image: Some("bitnami/kubectl:latest".to_string()),
        command: Some(vec!["sh".into(), "-c".into()]),
        args: Some(vec![format!(
            "kubectl get {}.{}.{} {} -o yaml > /output/object.yaml",
            source.plural, source.group, source.version, source.name
        )]),
        volume_mounts: Some(vec![VolumeMount {
            name: VOLUME_INPUT.to_string(),
            mount_path: "/output".to_string(),
            ..Default::default()
        }]),
        ..Default::default()
    }
}

fn pipeline_stage_container(index: usize, stage: &PipelineStage) -> Container {
    Container {
        name: stage.name.clone().unwrap_or_else(|| format!("pipeline-stage-{index}")),
        image: Some(stage.image.clone()),
        volume_mounts: Some(vec![
            VolumeMount { name: VOLUME_INPUT.to_string(), mount_path: "/input".to_string(), ..Default::default() },
            VolumeMount { name: VOLUME_OUTPUT.to_string(), mount_path: "/output".to_string(), ..Default::default() },
            VolumeMount { name: VOLUME_METADATA.to_string(), mount_path: "/metadata".to_string(), ..Default::default() },
        ]),
        ..Default::default()
    }
}

fn work_writer_container(input: &PodSpecInput<'_>) -> Container {
    let mut args = vec![
        "work-writer".to_string(),
        "--promise-name".to_string(),
        input.promise_name.to_string(),
        "--system-namespace".to_string(),
        input.system_namespace.to_string(),
    ];
    if let Some(resource_name) = input.resource_name {
        args.push("--resource-name".to_string());
        args.push(resource_name.to_string());
        args.push("--namespace".to_string());
        args.push(input.namespace.to_string());
    }

    Container {
        name: "work-writer".to_string(),
        image: Some(input.work_creator_image.to_string()),
        args: Some(args),
        volume_mounts: Some(work_creator_volume_mounts()),
        ..Default::default()
    }
}

fn status_writer_container(input: &PodSpecInput<'_>) -> Container {
    let source = &input.object_yaml_source;
    Container {
        name: "status-writer".to_string(),
        image: Some(input.work_creator_image.to_string()),
        args: Some(vec![
            "status-writer".into(),
            "--group".into(), source.group.into(),
            "--version".into(), source.version.into(),
            "--kind".into(), source.kind.into(),
            "--plural".into(), source.plural.into(),
            "--namespace".into(), input.namespace.into(),
            "--name".into(), source.name.into(),
        ]),
        volume_mounts: Some(vec![VolumeMount {
            name: VOLUME_METADATA.to_string(),
            mount_path: "/work-creator-files/metadata".to_string(),
            ..Default::default()
        }]),
        env: Some(vec![EnvVar {
            name: "RUST_LOG".to_string(),
            value: Some("info".to_string()),
            ..Default::default()
        }]),
        ..Default::default()
    }
}

fn work_creator_volume_mounts() -> Vec<VolumeMount> {
    vec![
        VolumeMount { name: VOLUME_OUTPUT.to_string(), mount_path: "/work-creator-files/input".to_string(), ..Default::default() },
        VolumeMount { name: VOLUME_METADATA.to_string(), mount_path: "/work-creator-files/metadata".to_string(), ..Default::default() },
        VolumeMount { name: VOLUME_CLUSTER_SELECTORS.to_string(), mount_path: "/work-creator-files/kratix-system".to_string(), ..Default::default() },
    ]
}

pub fn pod_labels(promise_name: &str, resource_request_id: Option<&str>) -> BTreeMap<String, String> {
    let mut labels = BTreeMap::from([(
        kratix_types::constants::labels::PROMISE_ID.to_string(),
        promise_name.to_string(),
    )]);
    if let Some(id) = resource_request_id {
        labels.insert(kratix_types::constants::labels::RESOURCE_REQUEST_ID.to_string(), id.to_string());
    }
    labels
}

pub fn pod_template_spec(input: &PodSpecInput<'_>, resource_request_id: Option<&str>) -> PodTemplateSpec {
    let mut init_containers = vec![reader_container(&input.object_yaml_source)];
    init_containers.extend(
        input
            .pipeline_stages
            .iter()
            .enumerate()
            .map(|(i, stage)| pipeline_stage_container(i, stage)),
    );
    init_containers.push(work_writer_container(input));

    PodTemplateSpec {
        metadata: Some(ObjectMeta {
            labels: Some(pod_labels(input.promise_name, resource_request_id)),
            ..Default::default()
        }),
        spec: Some(PodSpec {
            service_account_name: Some(pipeline_service_account_name(input.promise_name)),
            restart_policy: Some("OnFailure".to_string()),
            init_containers: Some(init_containers),
            containers: vec![status_writer_container(input)],
            volumes: Some(volumes(input.promise_name)),
            ..Default::default()
        }),
    }
}
