define_id_type! {
    /// A unique identifier for Momentum Mod users.
    pub struct UserId(i32);
}
