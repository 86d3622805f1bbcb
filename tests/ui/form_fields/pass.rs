use headless_form::{FieldPath, FormFields};

#[derive(headless_form::FormFields)]
struct DemoForm {
    #[allow(dead_code)]
    email: String,
    #[allow(dead_code)]
    #[form(rename = "homeAddress")]
    home_address: String,
}

fn main() {
    let fields = DemoForm::fields();
    let email: FieldPath = fields.email();
    assert_eq!(email.as_str(), "email");
    assert_eq!(fields.home_address().child("street").as_str(), "homeAddress.street");
    assert_eq!(DemoForm::field_names(), &["email", "homeAddress"]);
}
