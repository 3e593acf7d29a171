pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Display, Error, From)]
#[display("database error: {_0}")]
pub struct Error(sqlx::Error);
