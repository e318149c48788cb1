//! Appointments
//!
//! Visibility depends on the caller's role: front desk and nursing staff see
//! every appointment, doctors see their own, everyone else sees none.

use axum::{
    extract::State,
    http::StatusCode,
    Json,
};
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::{IntoParams, ToSchema};

use crate::auth::{policy, RoleName};
use crate::error::{api_success, ApiError, ApiResponse, ApiResult};
use crate::handlers::common::{fetch_page, Resource};
use crate::handlers::users::ensure_doctor;
use crate::middleware::{ApiJson, ApiPath, ApiQuery, AuthContext};
use crate::server::ChelalServer;
use crate::services::AuditAction;
use crate::types::PaginationParams;
use crate::validate_one_of;
use crate::validation::RequestValidation;

pub const STATUSES: [&str; 3] = ["scheduled", "completed", "cancelled"];

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Appointment {
    pub id: i64,
    pub patient_id: i64,
    pub doctor_id: i64,
    pub date: NaiveDate,
    #[schema(value_type = String, example = "09:30:00")]
    pub time: NaiveTime,
    #[schema(example = "scheduled")]
    pub status: String,
    pub notes: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Resource for Appointment {
    const TABLE: &'static str = "appointments";
    const LABEL: &'static str = "Appointment";
    const POLICY: policy::Policy = policy::APPOINTMENTS;
    const AUDIT_AS: Option<&'static str> = Some("appointment");
}

/// Which appointments a caller may see.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppointmentScope {
    All,
    Doctor(i64),
    Nothing,
}

impl AppointmentScope {
    pub fn for_caller(auth: &AuthContext) -> Self {
        if [RoleName::Admin, RoleName::Nurse, RoleName::Receptionist]
            .into_iter()
            .any(|role| auth.has_role(role))
        {
            AppointmentScope::All
        } else if auth.has_role(RoleName::Doctor) {
            AppointmentScope::Doctor(auth.user_id)
        } else {
            AppointmentScope::Nothing
        }
    }

    pub fn permits(&self, appointment: &Appointment) -> bool {
        match self {
            AppointmentScope::All => true,
            AppointmentScope::Doctor(id) => appointment.doctor_id == *id,
            AppointmentScope::Nothing => false,
        }
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateAppointmentRequest {
    pub patient_id: i64,
    pub doctor_id: i64,
    pub date: NaiveDate,
    #[schema(value_type = String, example = "09:30:00")]
    pub time: NaiveTime,
    pub status: Option<String>,
    #[serde(default)]
    pub notes: String,
}

impl RequestValidation for CreateAppointmentRequest {
    fn validate(&self) -> Result<(), ApiError> {
        if let Some(status) = &self.status {
            validate_one_of!(status, STATUSES, "status must be scheduled, completed or cancelled");
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateAppointmentRequest {
    pub patient_id: Option<i64>,
    pub doctor_id: Option<i64>,
    pub date: Option<NaiveDate>,
    #[schema(value_type = Option<String>)]
    pub time: Option<NaiveTime>,
    pub status: Option<String>,
    pub notes: Option<String>,
}

impl RequestValidation for UpdateAppointmentRequest {
    fn validate(&self) -> Result<(), ApiError> {
        if let Some(status) = &self.status {
            validate_one_of!(status, STATUSES, "status must be scheduled, completed or cancelled");
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct AppointmentListParams {
    pub page: Option<u32>,
    pub page_size: Option<u32>,
    pub patient_id: Option<i64>,
    pub doctor_id: Option<i64>,
    pub date: Option<NaiveDate>,
    pub status: Option<String>,
}

async fn fetch_visible(server: &ChelalServer, auth: &AuthContext, id: i64) -> ApiResult<Appointment> {
    let appointment = sqlx::query_as::<_, Appointment>("SELECT * FROM appointments WHERE id = $1")
        .bind(id)
        .fetch_optional(&server.db_pool)
        .await?
        .filter(|a| AppointmentScope::for_caller(auth).permits(a));

    appointment.ok_or_else(|| ApiError::not_found(Appointment::LABEL))
}

pub async fn list_appointments(
    State(server): State<ChelalServer>,
    auth: AuthContext,
    ApiQuery(params): ApiQuery<AppointmentListParams>,
) -> ApiResult<Json<ApiResponse<Vec<Appointment>>>> {
    auth.require(&Appointment::POLICY)?;
    let pagination = PaginationParams {
        page: params.page,
        page_size: params.page_size,
    };
    let scope = AppointmentScope::for_caller(&auth);

    let (rows, total) =
        fetch_page::<Appointment, _>(&server.db_pool, &pagination, ("date", "DESC"), |q| {
            match scope {
                AppointmentScope::All => {}
                AppointmentScope::Doctor(id) => {
                    q.add_base_filter("doctor_id", id);
                }
                AppointmentScope::Nothing => {
                    q.filter_raw("1 = 0");
                }
            }
            q.filter_eq("patient_id", params.patient_id)
                .filter_eq("doctor_id", params.doctor_id)
                .filter_eq("date", params.date)
                .filter_eq("status", params.status.clone());
        })
        .await?;

    Ok(Json(pagination.wrap_response(rows, total)))
}

pub async fn get_appointment(
    State(server): State<ChelalServer>,
    auth: AuthContext,
    ApiPath(id): ApiPath<i64>,
) -> ApiResult<Json<ApiResponse<Appointment>>> {
    auth.require(&Appointment::POLICY)?;
    Ok(Json(api_success(fetch_visible(&server, &auth, id).await?)))
}

pub async fn create_appointment(
    State(server): State<ChelalServer>,
    auth: AuthContext,
    ApiJson(req): ApiJson<CreateAppointmentRequest>,
) -> ApiResult<(StatusCode, Json<ApiResponse<Appointment>>)> {
    auth.require(&Appointment::POLICY)?;
    req.validate()?;
    ensure_doctor(&server.db_pool, req.doctor_id).await?;

    let appointment = sqlx::query_as::<_, Appointment>(
        r#"
        INSERT INTO appointments (patient_id, doctor_id, date, time, status, notes)
        VALUES ($1, $2, $3, $4, COALESCE($5, 'scheduled'), $6)
        RETURNING *
        "#,
    )
    .bind(req.patient_id)
    .bind(req.doctor_id)
    .bind(req.date)
    .bind(req.time)
    .bind(&req.status)
    .bind(&req.notes)
    .fetch_one(&server.db_pool)
    .await?;

    let message = format!(
        "New appointment on {} at {}",
        appointment.date,
        appointment.time.format("%H:%M")
    );
    if let Err(e) = server
        .notifications()
        .notify(
            appointment.doctor_id,
            "New appointment",
            &message,
            "appointment",
            Some(appointment.id),
        )
        .await
    {
        tracing::warn!(error = %e, appointment_id = appointment.id, "Doctor notification failed");
    }

    server
        .audit()
        .record(
            Some(auth.user_id),
            AuditAction::Create,
            "appointment",
            appointment.id,
            message,
            None,
        )
        .await;

    Ok((StatusCode::CREATED, Json(api_success(appointment))))
}

pub async fn update_appointment(
    State(server): State<ChelalServer>,
    auth: AuthContext,
    ApiPath(id): ApiPath<i64>,
    ApiJson(req): ApiJson<UpdateAppointmentRequest>,
) -> ApiResult<Json<ApiResponse<Appointment>>> {
    auth.require(&Appointment::POLICY)?;
    req.validate()?;
    fetch_visible(&server, &auth, id).await?;
    if let Some(doctor_id) = req.doctor_id {
        ensure_doctor(&server.db_pool, doctor_id).await?;
    }

    let appointment = sqlx::query_as::<_, Appointment>(
        r#"
        UPDATE appointments SET
            patient_id = COALESCE($2, patient_id),
            doctor_id = COALESCE($3, doctor_id),
            date = COALESCE($4, date),
            time = COALESCE($5, time),
            status = COALESCE($6, status),
            notes = COALESCE($7, notes),
            updated_at = NOW()
        WHERE id = $1
        RETURNING *
        "#,
    )
    .bind(id)
    .bind(req.patient_id)
    .bind(req.doctor_id)
    .bind(req.date)
    .bind(req.time)
    .bind(&req.status)
    .bind(&req.notes)
    .fetch_optional(&server.db_pool)
    .await?
    .ok_or_else(|| ApiError::not_found(Appointment::LABEL))?;

    server
        .audit()
        .record(
            Some(auth.user_id),
            AuditAction::Edit,
            "appointment",
            id,
            format!("Appointment {} updated", id),
            req.status
                .as_ref()
                .map(|status| serde_json::json!({ "status": status })),
        )
        .await;

    Ok(Json(api_success(appointment)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Method;

    fn caller(role: &str) -> AuthContext {
        AuthContext::new(7, "u", Some(role), Method::GET)
    }

    fn appointment(doctor_id: i64) -> Appointment {
        Appointment {
            id: 1,
            patient_id: 1,
            doctor_id,
            date: NaiveDate::from_ymd_opt(2025, 3, 1).unwrap(),
            time: NaiveTime::from_hms_opt(9, 30, 0).unwrap(),
            status: "scheduled".into(),
            notes: String::new(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn scope_follows_role() {
        assert_eq!(AppointmentScope::for_caller(&caller("Nurse")), AppointmentScope::All);
        assert_eq!(AppointmentScope::for_caller(&caller("receptionist")), AppointmentScope::All);
        assert_eq!(AppointmentScope::for_caller(&caller("Doctor")), AppointmentScope::Doctor(7));
        assert_eq!(AppointmentScope::for_caller(&caller("Pharmacist")), AppointmentScope::Nothing);
    }

    #[test]
    fn doctors_only_see_their_own() {
        let scope = AppointmentScope::Doctor(7);
        assert!(scope.permits(&appointment(7)));
        assert!(!scope.permits(&appointment(8)));
        assert!(!AppointmentScope::Nothing.permits(&appointment(7)));
    }

    #[test]
    fn unknown_status_is_rejected() {
        let req: CreateAppointmentRequest = serde_json::from_str(
            r#"{"patient_id": 1, "doctor_id": 2, "date": "2025-03-01", "time": "09:30:00", "status": "no-show"}"#,
        )
        .unwrap();
        assert!(req.validate().is_err());
    }
}
