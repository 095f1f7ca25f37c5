use crate::models::Claims;
use jsonwebtoken::{DecodingKey, Validation, decode, errors::Error};

pub fn verify_token(token: &str, secret: &str) -> Result<Claims, Error> {
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map(|data| data.claims)
}


#[cfg(test)]
mod tests {
    use super::testing::{SECRET, token_for};
    use super::*;
    use crate::models::TokenType;

    #[test]
    fn verifies_a_token_signed_with_the_same_secret() {
        let token = token_for(5, 3, Some(101), TokenType::Access);
        let claims = verify_token(&token, SECRET).unwrap();
        assert_eq!(claims.user_id, 5);
        assert_eq!(claims.employee_id, Some(101));
        assert_eq!(claims.token_type, TokenType::Access);
    }

    #[test]
    fn rejects_a_token_signed_with_another_secret() {
        let token = token_for(5, 3, Some(101), TokenType::Access);
        assert!(verify_token(&token, "other-secret").is_err());
        assert!(verify_token("not-a-token", SECRET).is_err());
    }
}
