mod common;

use common::{RG, SUB, rg_id, session};
use serde_json::json;
use vmflow_cloud::{
    CloudError, ErrorKind, Guardrail, PlanOperation, PlanStatus, ResourceReference, StepStatus,
};
use vmflow_cloud_azure::{DeploymentMode, HttpResponse, Method};

const VM: &str = "virtualMachines/vm01";

fn conflict() -> serde_json::Value {
    json!({"error": {"code": "OperationNotAllowed", "message": "Operation 'delete' is not allowed on VM 'vm01' since the VM is being updated."}})
}

#[tokio::test(start_paused = true)]
async fn test_delete_vm_waits_for_location_monitor() {
    let (backend, azure) = session(Guardrail::enabled());
    backend
        .on(
            Method::Delete,
            VM,
            HttpResponse::new(202, "")
                .with_header("Location", format!("https://management.azure.com/subscriptions/{}/providers/Microsoft.Compute/locations/eastasia/operations/del-1", SUB)),
        )
        .on(Method::Get, "operations/del-1", HttpResponse::new(202, ""))
        .on(Method::Get, "operations/del-1", HttpResponse::new(200, ""));

    let result = azure.provisioner.delete_vm(RG, "vm01", false).await.unwrap();

    assert_eq!(result.status(), PlanStatus::Succeeded);
    assert_eq!(result.operation(), PlanOperation::Delete);
    assert!(result.created_resources().is_empty());
    assert_eq!(backend.calls_to(Method::Get, "operations/del-1").len(), 2);
    let delete = &backend.calls_to(Method::Delete, VM)[0];
    assert!(!delete.url.contains("forceDeletion"));
}

#[tokio::test(start_paused = true)]
async fn test_forced_delete_retries_conflict_once() {
    let (backend, azure) = session(Guardrail::enabled());
    backend
        .on_json(Method::Delete, "forceDeletion=true", 200, json!({}))
        .on_json(Method::Delete, VM, 409, conflict());

    let result = azure.provisioner.delete_vm(RG, "vm01", true).await.unwrap();

    assert_eq!(result.status(), PlanStatus::Succeeded);
    let deletes = backend.calls_to(Method::Delete, VM);
    assert_eq!(deletes.len(), 2);
    assert!(deletes[1].url.ends_with("api-version=2024-07-01&forceDeletion=true"));
}

#[tokio::test(start_paused = true)]
async fn test_conflict_without_force_is_a_failed_step() {
    let (backend, azure) = session(Guardrail::enabled());
    backend.on_json(Method::Delete, VM, 409, conflict());

    let result = azure.provisioner.delete_vm(RG, "vm01", false).await.unwrap();

    assert_eq!(result.status(), PlanStatus::Failed);
    let step = &result.steps()[0];
    assert_eq!(step.status, StepStatus::Failed);
    assert_eq!(step.error.as_ref().and_then(|e| e.status), Some(409));
    assert_eq!(backend.calls_to(Method::Delete, VM).len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_force_applies_only_to_virtual_machines() {
    let (backend, azure) = session(Guardrail::enabled());
    backend.on_json(Method::Delete, "networkInterfaces/nic1", 409, json!({"error": {"code": "NicInUse"}}));
    let nic = ResourceReference::parse(rg_id("Microsoft.Network/networkInterfaces", "nic1")).unwrap();

    let result = azure.provisioner.delete_resource(&nic, true).await.unwrap();

    assert_eq!(result.status(), PlanStatus::Failed);
    assert_eq!(backend.calls_to(Method::Delete, "networkInterfaces/nic1").len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_delete_of_absent_resource_succeeds() {
    let (backend, azure) = session(Guardrail::enabled());
    backend.on_json(Method::Delete, VM, 404, json!({"error": {"code": "ResourceNotFound"}}));

    let result = azure.provisioner.delete_vm(RG, "vm01", false).await.unwrap();
    assert!(result.is_success());
}

#[tokio::test(start_paused = true)]
async fn test_delete_is_guarded() {
    let (backend, azure) = session(Guardrail::disabled());

    let err = azure.provisioner.delete_vm(RG, "vm01", true).await.unwrap_err();
    assert!(matches!(err, CloudError::GuardrailDenied { .. }));

    let err = azure.provisioner.delete_deployment(RG, "dep1").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::GuardrailDenied);
    assert_eq!(backend.call_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_unsupported_resource_type_is_refused() {
    let (backend, azure) = session(Guardrail::enabled());
    let account = ResourceReference::parse(rg_id("Microsoft.Storage/storageAccounts", "st01")).unwrap();

    let err = azure.provisioner.delete_resource(&account, false).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::PlanningError);
    assert_eq!(backend.call_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_deploy_template_sends_incremental_deployment() {
    let (backend, azure) = session(Guardrail::enabled());
    backend
        .on(
            Method::Put,
            "deployments/dep1",
            HttpResponse::new(201, json!({"properties": {"provisioningState": "Accepted"}}).to_string())
                .with_header("Azure-AsyncOperation", "https://management.azure.com/deployments/dep1/operationStatuses/1"),
        )
        .on_json(Method::Get, "operationStatuses/1", 200, json!({"status": "Running"}))
        .on_json(Method::Get, "operationStatuses/1", 200, json!({"status": "Succeeded"}));
    let template = json!({
        "$schema": "https://schema.management.azure.com/schemas/2019-04-01/deploymentTemplate.json#",
        "contentVersion": "1.0.0.0",
        "resources": []
    });

    let result = azure
        .provisioner
        .deploy_template(RG, "dep1", &template, &json!({"vmName": {"value": "vm01"}}), DeploymentMode::Incremental)
        .await
        .unwrap();

    assert!(result.is_success());
    assert_eq!(result.operation(), PlanOperation::Template);
    let put = &backend.calls_to(Method::Put, "deployments/dep1")[0];
    assert!(put.url.contains("Microsoft.Resources/deployments/dep1?api-version=2021-04-01"));
    let body = put.body.as_ref().unwrap();
    assert_eq!(body["properties"]["mode"], "Incremental");
    assert_eq!(body["properties"]["parameters"]["vmName"]["value"], "vm01");
    assert_eq!(body["properties"]["template"]["contentVersion"], "1.0.0.0");
}

#[tokio::test(start_paused = true)]
async fn test_deploy_template_rejects_non_object_template() {
    let (backend, azure) = session(Guardrail::enabled());
    let err = azure
        .provisioner
        .deploy_template(RG, "dep1", &json!("nope"), &json!({}), DeploymentMode::Incremental)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::PlanningError);
    assert_eq!(backend.call_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_delete_deployment_removes_only_the_record() {
    let (backend, azure) = session(Guardrail::enabled());
    backend.on(Method::Delete, "deployments/dep1", HttpResponse::new(204, ""));

    let result = azure.provisioner.delete_deployment(RG, "dep1").await.unwrap();

    assert!(result.is_success());
    let calls = backend.resource_calls();
    assert_eq!(calls.len(), 1);
    assert!(calls[0].url.contains("Microsoft.Resources/deployments/dep1?api-version=2021-04-01"));
}
