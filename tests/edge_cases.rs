use dynsql::{
    render, EngineConfig, Error, EvaluationError, ParameterContext, PlaceholderStyle, SqlEngine,
    Template, Value,
};
use serde_json::json;

fn sql(template: &str, params: serde_json::Value) -> String {
    render(template, &ParameterContext::from_json(params)).unwrap().sql
}

// ── Loops ──

#[test]
fn empty_loop_renders_nothing_at_all() {
    let template = r#"<foreach collection="ids" item="id" open="(" separator="," close=")">#{id}</foreach>"#;
    let bound = render(template, &ParameterContext::from_json(json!({"ids": []}))).unwrap();
    assert_eq!(bound.sql, "");
    assert!(bound.bindings.is_empty());
}

#[test]
fn loop_variables_do_not_leak() {
    let template = r#"<foreach collection="xs" item="x" index="i">#{x}</foreach> <if test="x == null and i == null">clean</if>"#;
    assert_eq!(sql(template, json!({"xs": [1, 2]})), "?  ?   clean");
}

#[test]
fn loop_item_shadows_outer_variable() {
    let template = r#"<foreach collection="xs" item="x">${x}</foreach> ${x}"#;
    assert_eq!(sql(template, json!({"xs": ["a", "b"], "x": "outer"})), "a  b  outer");
}

#[test]
fn nested_loops_bind_independently() {
    let template = r#"<foreach collection="rows" item="row" separator=",">(<foreach collection="row" item="cell" separator=",">#{cell}</foreach>)</foreach>"#;
    let bound = render(
        template,
        &ParameterContext::from_json(json!({"rows": [[1, 2], [3]]})),
    )
    .unwrap();
    assert_eq!(bound.sql, "(  ? , ? ) , (  ? )");
    let values: Vec<&Value> = bound.values();
    assert_eq!(values, vec![&Value::Int(1), &Value::Int(2), &Value::Int(3)]);
}

#[test]
fn inline_list_as_loop_source() {
    let template = r#"in <foreach collection="[1, 2]" item="n" open="(" close=")" separator=",">${n}</foreach>"#;
    assert_eq!(sql(template, json!({})), "in  (  1 , 2 )");
}

// ── Choice, bind, wrappers ──

#[test]
fn choice_renders_only_first_true_branch() {
    let template = r#"<choose><when test="false">A</when><when test="true">B</when><when test="true">B2</when><otherwise>C</otherwise></choose>"#;
    assert_eq!(sql(template, json!({})), "B");
}

#[test]
fn choice_without_match_or_otherwise_is_empty() {
    let template = r#"x <choose><when test="a == 1">A</when></choose>"#;
    assert_eq!(sql(template, json!({"a": 2})), "x");
}

#[test]
fn otherwise_is_trimmed_by_enclosing_where() {
    let template = r#"select 1 <where><choose><when test="false">and a</when><otherwise>and X</otherwise></choose></where>"#;
    assert_eq!(sql(template, json!({})), "select 1  WHERE  X");
}

#[test]
fn bind_is_visible_to_later_siblings() {
    let template = r#"<bind name="pattern" value="'%' + name + '%'"/>name like #{pattern}"#;
    let bound = render(template, &ParameterContext::new().with("name", "ann")).unwrap();
    assert_eq!(bound.sql, "name like ?");
    assert_eq!(bound.bindings[0].property, "pattern");
    assert_eq!(bound.bindings[0].value, Value::from("%ann%"));
}

#[test]
fn set_with_nothing_to_update_is_empty() {
    let template = r#"update t <set><if test="a != null">a = #{a},</if></set>"#;
    assert_eq!(sql(template, json!({})), "update t");
}

#[test]
fn set_left_empty_by_override_stripping_is_dropped() {
    assert_eq!(sql("update t <set>,</set>", json!({})), "update t");
}

#[test]
fn custom_trim_wraps_and_strips() {
    let template = r#"insert into t <trim prefix="(" suffix=")" suffixOverrides=","><if test="a != null">a,</if><if test="b != null">b,</if></trim>"#;
    assert_eq!(sql(template, json!({"a": 1, "b": 2})), "insert into t  ( a,b )");
}

#[test]
fn where_does_not_eat_words_starting_with_a_connector() {
    let template = r#"select 1 <where> order_no = 1</where>"#;
    assert_eq!(sql(template, json!({})), "select 1  WHERE order_no = 1");
}

// ── Placeholders and substitution ──

#[test]
fn placeholder_order_follows_document_order_across_nesting() {
    let template = r#"#{a} <where><if test="true"><choose><when test="true">#{b}</when></choose></if></where> #{c}"#;
    let bound = render(
        template,
        &ParameterContext::from_json(json!({"a": "A", "b": "B", "c": "C"})),
    )
    .unwrap();
    let properties: Vec<&str> = bound.bindings.iter().map(|b| b.property.as_str()).collect();
    assert_eq!(properties, vec!["a", "b", "c"]);
}

#[test]
fn substitution_inlines_display_form() {
    let template = "select * from ${table} order by ${column} limit ${n}";
    assert_eq!(
        sql(template, json!({"table": "user", "column": "id", "n": 10})),
        "select * from user order by id limit 10"
    );
}

#[test]
fn braces_inside_markers_do_not_end_them() {
    let bound = render(
        "n = ${ {1,2}.size() } and k = #{a == '}' ? 1 : 2}",
        &ParameterContext::new().with("a", "}"),
    )
    .unwrap();
    assert_eq!(bound.sql, "n = 2 and k = ?");
    assert_eq!(bound.values(), vec![&Value::Int(1)]);
}

#[test]
fn null_placeholder_value_is_bound_not_an_error() {
    let bound = render("a = #{a}", &ParameterContext::from_json(json!({"a": null}))).unwrap();
    assert_eq!(bound.bindings[0].value, Value::Null);
}

#[test]
fn scalar_parameter_is_reachable_as_value() {
    let bound = render("id = #{value}", &ParameterContext::from_value(Value::Int(3))).unwrap();
    assert_eq!(bound.values(), vec![&Value::Int(3)]);
}

#[test]
fn null_parameter_object_is_still_bound() {
    let bound = render("x = #{_parameter}", &ParameterContext::from_value(Value::Null)).unwrap();
    assert_eq!(bound.sql, "x = ?");
    assert_eq!(bound.values(), vec![&Value::Null]);
    assert_eq!(sql(r#"x <if test="value == null">is null</if>"#, json!(null)), "x  is null");
}

#[test]
fn numbered_placeholders_count_across_loops() {
    let engine = SqlEngine::with_config(EngineConfig {
        placeholder_style: PlaceholderStyle::Numbered,
        ..EngineConfig::default()
    });
    let bound = engine
        .render(
            r#"a = #{a} and b in <foreach collection="bs" item="b" open="(" close=")" separator=",">#{b}</foreach>"#,
            &ParameterContext::from_json(json!({"a": 0, "bs": [1, 2]})),
        )
        .unwrap();
    assert_eq!(bound.sql, "a = $1 and b in  (  $2 , $3 )");
}

// ── Text handling ──

#[test]
fn cdata_and_entities() {
    let template = "<where><if test=\"true\"><![CDATA[ a < 1 ]]></if> and b &lt;&gt; 2</where>";
    assert_eq!(sql(template, json!({})), "WHERE a < 1  and b <> 2");
}

#[test]
fn comparison_operators_in_text_are_not_markup() {
    let template = r#"select 1 where a <= 2 and b < 3 <if test="true">and c <> 4</if>"#;
    assert_eq!(sql(template, json!({})), "select 1 where a <= 2 and b < 3  and c <> 4");
}

#[test]
fn rendering_twice_is_identical() {
    let template = Template::compile(
        r#"select * from t <where><foreach collection="ids" item="id" separator=" or ">id = #{id}</foreach></where>"#,
    )
    .unwrap();
    let params = ParameterContext::from_json(json!({"ids": [1, 2]}));
    let config = EngineConfig::default();
    let first = template.render(&params, &config).unwrap();
    let second = template.render(&params, &config).unwrap();
    assert_eq!(first, second);
    assert_eq!(first.sql, "select * from t  WHERE id = ? or id = ?");
}

// ── Errors ──

#[test]
fn undefined_placeholder_aborts_the_render() {
    let err = render("a = #{a} and b = #{b}", &ParameterContext::new().with("a", 1)).unwrap_err();
    match err {
        Error::Evaluation { expression, source } => {
            assert_eq!(expression, "b");
            assert_eq!(source, EvaluationError::Undefined { path: "b".to_string() });
        }
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn missing_variable_in_test_is_falsy() {
    assert_eq!(sql(r#"x <if test="flag">y</if>"#, json!({})), "x");
}

#[test]
fn negated_method_on_missing_variable_is_falsy() {
    assert_eq!(sql(r#"x <if test="!list.isEmpty()">y #{list}</if>"#, json!({})), "x");
    assert_eq!(sql(r#"x <if test="!list.isEmpty()">y</if>"#, json!({"list": [1]})), "x  y");
}

#[test]
fn type_mismatch_in_test_is_an_error() {
    let err = render(r#"<if test="name > 3">y</if>"#, &ParameterContext::new().with("name", "ann")).unwrap_err();
    assert_eq!(err.code(), "TYPE_MISMATCH");
}

#[test]
fn syntax_errors_carry_positions() {
    let err = render("select 1\n  <where>\n    <iff test=\"a\">x</iff>\n  </where>", &ParameterContext::new())
        .unwrap_err();
    let Error::Syntax(syntax) = err else {
        panic!("expected syntax error");
    };
    assert_eq!(syntax.message, "unknown directive `<iff>`");
    assert_eq!((syntax.position.line, syntax.position.column), (3, 5));
}

#[test]
fn unknown_method_is_rejected_at_compile_time() {
    let err = Template::compile(r#"<if test="name.explode()">x</if>"#).unwrap_err();
    assert!(err.message.starts_with("invalid expression `name.explode()`"));
}
