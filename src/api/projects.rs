//! Project endpoints

use crate::api::projects::schemas::{CreateProject, ProjectList, ProjectPayload, UpdateProject};
use crate::api::{ApiResponse, ExtractUser, JsonBody, PathId};
use crate::core::traits::{ProjectChanges, ProjectService};
use crate::error::ApiResult;
use axum::Router;
use axum::response::IntoResponse;
use axum::routing::get;
use di_axum::Inject;

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_projects).post(create_project))
        .route(
            "/:id",
            get(get_project).put(update_project).delete(delete_project),
        )
}

async fn list_projects(
    Inject(project_service): Inject<dyn ProjectService>,
    ExtractUser(user): ExtractUser,
) -> ApiResult<impl IntoResponse> {
    let projects = project_service.list_projects(user.id).await?;

    Ok(ApiResponse::ok(ProjectList {
        projects: projects.into_iter().map(schemas::Project::from).collect(),
    }))
}

async fn create_project(
    Inject(project_service): Inject<dyn ProjectService>,
    ExtractUser(user): ExtractUser,
    JsonBody(create): JsonBody<CreateProject>,
) -> ApiResult<impl IntoResponse> {
    let project = project_service
        .create_project(
            user.id,
            &create.name,
            create.description.as_deref(),
            &create.system_prompt,
        )
        .await?;

    Ok(ApiResponse::created(ProjectPayload {
        project: project.into(),
    }))
}

async fn get_project(
    Inject(project_service): Inject<dyn ProjectService>,
    ExtractUser(user): ExtractUser,
    PathId(project_id): PathId,
) -> ApiResult<impl IntoResponse> {
    let project = project_service.get_project(user.id, project_id).await?;

    Ok(ApiResponse::ok(ProjectPayload {
        project: project.into(),
    }))
}

async fn update_project(
    Inject(project_service): Inject<dyn ProjectService>,
    ExtractUser(user): ExtractUser,
    PathId(project_id): PathId,
    JsonBody(update): JsonBody<UpdateProject>,
) -> ApiResult<impl IntoResponse> {
    let changes = ProjectChanges {
        name: update.name,
        description: update.description,
        system_prompt: update.system_prompt,
    };
    let project = project_service
        .update_project(user.id, project_id, changes)
        .await?;

    Ok(ApiResponse::ok(ProjectPayload {
        project: project.into(),
    }))
}

async fn delete_project(
    Inject(project_service): Inject<dyn ProjectService>,
    ExtractUser(user): ExtractUser,
    PathId(project_id): PathId,
) -> ApiResult<impl IntoResponse> {
    project_service.delete_project(user.id, project_id).await?;
    Ok(ApiResponse::message("Project deleted"))
}

pub mod schemas {
    use crate::infrastructure::entities;
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Serialize};
    use uuid::Uuid;

    #[derive(Deserialize, Debug)]
    #[serde(rename_all = "camelCase")]
    pub struct CreateProject {
        #[serde(default)]
        pub name: String,
        pub description: Option<String>,
        #[serde(default)]
        pub system_prompt: String,
    }

    #[derive(Deserialize, Debug, Default)]
    #[serde(rename_all = "camelCase")]
    pub struct UpdateProject {
        pub name: Option<String>,
        pub description: Option<String>,
        pub system_prompt: Option<String>,
    }

    #[derive(Serialize, Debug)]
    #[serde(rename_all = "camelCase")]
    pub struct Project {
        pub id: Uuid,
        pub name: String,
        pub description: Option<String>,
        pub system_prompt: String,
        pub created_at: DateTime<Utc>,
        pub updated_at: DateTime<Utc>,
    }

    impl From<entities::Project> for Project {
        fn from(project: entities::Project) -> Self {
            Project {
                id: project.id,
                name: project.name,
                description: project.description,
                system_prompt: project.system_prompt,
                created_at: project.created_at,
                updated_at: project.updated_at,
            }
        }
    }

    #[derive(Serialize, Debug)]
    pub struct ProjectList {
        pub projects: Vec<Project>,
    }

    #[derive(Serialize, Debug)]
    pub struct ProjectPayload {
        pub project: Project,
    }
}
