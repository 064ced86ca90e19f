use actix_web::{
    delete, error::JsonPayloadError, error::PathError, get, patch, post, put, web, HttpRequest,
    HttpResponse,
};

use crate::dto::{
    into_responses, ActiveRequest, ExpenseRequest, ExpenseResponse, GroupBalancesResponse,
    GroupRequest, GroupResponse, SettlementRequest, SettlementResponse, StatusRequest,
    UserBalanceResponse, UserRequest, UserResponse,
};
use crate::error::ServiceError;
use crate::schemas::ExpenseStatus;
use crate::service::Service;

type Reply = Result<HttpResponse, ServiceError>;

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.app_data(web::JsonConfig::default().error_handler(invalid_json))
        .app_data(web::PathConfig::default().error_handler(invalid_path));

    cfg.service(create_user)
        .service(list_users)
        .service(get_user_by_email)
        .service(users_of_group)
        .service(get_user)
        .service(update_user)
        .service(delete_user)
        .service(set_user_active)
        .service(create_group)
        .service(list_groups)
        .service(groups_of_user)
        .service(group_balances)
        .service(get_group)
        .service(update_group)
        .service(delete_group)
        .service(add_member)
        .service(remove_member)
        .service(create_expense)
        .service(list_expenses)
        .service(expenses_of_group)
        .service(expenses_paid_by)
        .service(expenses_of_beneficiary)
        .service(expenses_with_status)
        .service(get_expense)
        .service(update_expense)
        .service(set_expense_status)
        .service(delete_expense)
        .service(record_settlement)
        .service(list_settlements)
        .service(settlements_of_group)
        .service(user_balance)
        .service(settlements_of_user)
        .service(calculate_settlements)
        .service(get_settlement)
        .service(delete_group_settlements)
        .service(delete_settlement);
}

// Extractor failures answer with the same body as every other error.
fn invalid_json(err: JsonPayloadError, _req: &HttpRequest) -> actix_web::Error {
    ServiceError::Validation(format!("invalid request body: {err}")).into()
}

fn invalid_path(err: PathError, _req: &HttpRequest) -> actix_web::Error {
    ServiceError::Validation(format!("invalid path: {err}")).into()
}

// Users

#[post("/api/users")]
async fn create_user(service: web::Data<Service>, json: web::Json<UserRequest>) -> Reply {
    let user = service.create_user(json.into_inner()).await?;
    Ok(HttpResponse::Created().json(UserResponse::from(user)))
}

#[get("/api/users")]
async fn list_users(service: web::Data<Service>) -> Reply {
    let users = service.list_users().await?;
    Ok(HttpResponse::Ok().json(into_responses::<_, UserResponse>(users)))
}

#[get("/api/users/email/{email}")]
async fn get_user_by_email(service: web::Data<Service>, email: web::Path<String>) -> Reply {
    let user = service.get_user_by_email(&email).await?;
    Ok(HttpResponse::Ok().json(UserResponse::from(user)))
}

#[get("/api/users/group/{group_id}")]
async fn users_of_group(service: web::Data<Service>, group_id: web::Path<String>) -> Reply {
    let users = service.users_of_group(&group_id).await?;
    Ok(HttpResponse::Ok().json(into_responses::<_, UserResponse>(users)))
}

#[get("/api/users/{id}")]
async fn get_user(service: web::Data<Service>, id: web::Path<String>) -> Reply {
    let user = service.get_user(&id).await?;
    Ok(HttpResponse::Ok().json(UserResponse::from(user)))
}

#[put("/api/users/{id}")]
async fn update_user(
    service: web::Data<Service>,
    id: web::Path<String>,
    json: web::Json<UserRequest>,
) -> Reply {
    let user = service.update_user(&id, json.into_inner()).await?;
    Ok(HttpResponse::Ok().json(UserResponse::from(user)))
}

#[delete("/api/users/{id}")]
async fn delete_user(service: web::Data<Service>, id: web::Path<String>) -> Reply {
    service.delete_user(&id).await?;
    Ok(HttpResponse::NoContent().finish())
}

#[patch("/api/users/{id}/active")]
async fn set_user_active(
    service: web::Data<Service>,
    id: web::Path<String>,
    json: web::Json<ActiveRequest>,
) -> Reply {
    let user = service.set_user_active(&id, json.active).await?;
    Ok(HttpResponse::Ok().json(UserResponse::from(user)))
}

// Groups

#[post("/api/groups")]
async fn create_group(service: web::Data<Service>, json: web::Json<GroupRequest>) -> Reply {
    let group = service.create_group(json.into_inner()).await?;
    Ok(HttpResponse::Created().json(GroupResponse::from(group)))
}

#[get("/api/groups")]
async fn list_groups(service: web::Data<Service>) -> Reply {
    let groups = service.list_groups().await?;
    Ok(HttpResponse::Ok().json(into_responses::<_, GroupResponse>(groups)))
}

#[get("/api/groups/user/{user_id}")]
async fn groups_of_user(service: web::Data<Service>, user_id: web::Path<String>) -> Reply {
    let groups = service.groups_of_user(&user_id).await?;
    Ok(HttpResponse::Ok().json(into_responses::<_, GroupResponse>(groups)))
}

#[get("/api/groups/{id}/balances")]
async fn group_balances(service: web::Data<Service>, id: web::Path<String>) -> Reply {
    let balances = service.group_balances(&id).await?;
    Ok(HttpResponse::Ok().json(GroupBalancesResponse {
        group_id: id.into_inner(),
        balances,
    }))
}

#[get("/api/groups/{id}")]
async fn get_group(service: web::Data<Service>, id: web::Path<String>) -> Reply {
    let group = service.get_group(&id).await?;
    Ok(HttpResponse::Ok().json(GroupResponse::from(group)))
}

#[put("/api/groups/{id}")]
async fn update_group(
    service: web::Data<Service>,
    id: web::Path<String>,
    json: web::Json<GroupRequest>,
) -> Reply {
    let group = service.update_group(&id, json.into_inner()).await?;
    Ok(HttpResponse::Ok().json(GroupResponse::from(group)))
}

#[delete("/api/groups/{id}")]
async fn delete_group(service: web::Data<Service>, id: web::Path<String>) -> Reply {
    service.delete_group(&id).await?;
    Ok(HttpResponse::NoContent().finish())
}

#[post("/api/groups/{group_id}/users/{user_id}")]
async fn add_member(service: web::Data<Service>, path: web::Path<(String, String)>) -> Reply {
    let (group_id, user_id) = path.into_inner();
    let group = service.add_member(&group_id, &user_id).await?;
    Ok(HttpResponse::Ok().json(GroupResponse::from(group)))
}

#[delete("/api/groups/{group_id}/users/{user_id}")]
async fn remove_member(service: web::Data<Service>, path: web::Path<(String, String)>) -> Reply {
    let (group_id, user_id) = path.into_inner();
    let group = service.remove_member(&group_id, &user_id).await?;
    Ok(HttpResponse::Ok().json(GroupResponse::from(group)))
}

// Expenses

#[post("/api/expenses")]
async fn create_expense(service: web::Data<Service>, json: web::Json<ExpenseRequest>) -> Reply {
    let expense = service.create_expense(json.into_inner()).await?;
    Ok(HttpResponse::Created().json(ExpenseResponse::from(expense)))
}

#[get("/api/expenses")]
async fn list_expenses(service: web::Data<Service>) -> Reply {
    let expenses = service.list_expenses().await?;
    Ok(HttpResponse::Ok().json(into_responses::<_, ExpenseResponse>(expenses)))
}

#[get("/api/expenses/group/{group_id}")]
async fn expenses_of_group(service: web::Data<Service>, group_id: web::Path<String>) -> Reply {
    let expenses = service.expenses_of_group(&group_id).await?;
    Ok(HttpResponse::Ok().json(into_responses::<_, ExpenseResponse>(expenses)))
}

#[get("/api/expenses/payer/{user_id}")]
async fn expenses_paid_by(service: web::Data<Service>, user_id: web::Path<String>) -> Reply {
    let expenses = service.expenses_paid_by(&user_id).await?;
    Ok(HttpResponse::Ok().json(into_responses::<_, ExpenseResponse>(expenses)))
}

#[get("/api/expenses/group/{group_id}/beneficiary/{user_id}")]
async fn expenses_of_beneficiary(
    service: web::Data<Service>,
    path: web::Path<(String, String)>,
) -> Reply {
    let (group_id, user_id) = path.into_inner();
    let expenses = service.expenses_of_beneficiary(&group_id, &user_id).await?;
    Ok(HttpResponse::Ok().json(into_responses::<_, ExpenseResponse>(expenses)))
}

#[get("/api/expenses/status/{status}")]
async fn expenses_with_status(
    service: web::Data<Service>,
    status: web::Path<ExpenseStatus>,
) -> Reply {
    let expenses = service.expenses_with_status(status.into_inner()).await?;
    Ok(HttpResponse::Ok().json(into_responses::<_, ExpenseResponse>(expenses)))
}

#[get("/api/expenses/{id}")]
async fn get_expense(service: web::Data<Service>, id: web::Path<String>) -> Reply {
    let expense = service.get_expense(&id).await?;
    Ok(HttpResponse::Ok().json(ExpenseResponse::from(expense)))
}

#[put("/api/expenses/{id}")]
async fn update_expense(
    service: web::Data<Service>,
    id: web::Path<String>,
    json: web::Json<ExpenseRequest>,
) -> Reply {
    let expense = service.update_expense(&id, json.into_inner()).await?;
    Ok(HttpResponse::Ok().json(ExpenseResponse::from(expense)))
}

#[patch("/api/expenses/{id}/status")]
async fn set_expense_status(
    service: web::Data<Service>,
    id: web::Path<String>,
    json: web::Json<StatusRequest>,
) -> Reply {
    let expense = service.set_expense_status(&id, json.status).await?;
    Ok(HttpResponse::Ok().json(ExpenseResponse::from(expense)))
}

#[delete("/api/expenses/{id}")]
async fn delete_expense(service: web::Data<Service>, id: web::Path<String>) -> Reply {
    service.delete_expense(&id).await?;
    Ok(HttpResponse::NoContent().finish())
}

// Settlements

#[post("/api/settlements")]
async fn record_settlement(
    service: web::Data<Service>,
    json: web::Json<SettlementRequest>,
) -> Reply {
    let settlement = service.record_settlement(json.into_inner()).await?;
    Ok(HttpResponse::Created().json(SettlementResponse::from(settlement)))
}

#[get("/api/settlements")]
async fn list_settlements(service: web::Data<Service>) -> Reply {
    let settlements = service.list_settlements().await?;
    Ok(HttpResponse::Ok().json(into_responses::<_, SettlementResponse>(settlements)))
}

#[get("/api/settlements/group/{group_id}")]
async fn settlements_of_group(service: web::Data<Service>, group_id: web::Path<String>) -> Reply {
    let settlements = service.settlements_of_group(&group_id).await?;
    Ok(HttpResponse::Ok().json(into_responses::<_, SettlementResponse>(settlements)))
}

#[get("/api/settlements/user/{user_id}/balance")]
async fn user_balance(service: web::Data<Service>, user_id: web::Path<String>) -> Reply {
    let balance = service.user_balance(&user_id).await?;
    Ok(HttpResponse::Ok().json(UserBalanceResponse {
        user_id: user_id.into_inner(),
        balance,
    }))
}

#[get("/api/settlements/user/{user_id}")]
async fn settlements_of_user(service: web::Data<Service>, user_id: web::Path<String>) -> Reply {
    let settlements = service.settlements_of_user(&user_id).await?;
    Ok(HttpResponse::Ok().json(into_responses::<_, SettlementResponse>(settlements)))
}

#[post("/api/settlements/calculate/{group_id}")]
async fn calculate_settlements(
    service: web::Data<Service>,
    group_id: web::Path<String>,
) -> Reply {
    let settlements = service.calculate_settlements(&group_id).await?;
    Ok(HttpResponse::Ok().json(into_responses::<_, SettlementResponse>(settlements)))
}

#[get("/api/settlements/{id}")]
async fn get_settlement(service: web::Data<Service>, id: web::Path<String>) -> Reply {
    let settlement = service.get_settlement(&id).await?;
    Ok(HttpResponse::Ok().json(SettlementResponse::from(settlement)))
}

#[delete("/api/settlements/group/{group_id}")]
async fn delete_group_settlements(
    service: web::Data<Service>,
    group_id: web::Path<String>,
) -> Reply {
    service.delete_group_settlements(&group_id).await?;
    Ok(HttpResponse::NoContent().finish())
}

#[delete("/api/settlements/{id}")]
async fn delete_settlement(service: web::Data<Service>, id: web::Path<String>) -> Reply {
    service.delete_settlement(&id).await?;
    Ok(HttpResponse::NoContent().finish())
}
